use super::{ComponentState, DashboardOrchestrator};
use std::collections::HashMap;
use tracing::debug;

impl DashboardOrchestrator {
    pub async fn set_component_state(&self, component: &str, state: ComponentState) {
        let mut states = self.component_states.lock().await;
        debug!("Component '{}' -> {:?}", component, state);
        states.insert(component.to_string(), state);
    }

    pub async fn get_component_state(&self, component: &str) -> Option<ComponentState> {
        self.component_states.lock().await.get(component).cloned()
    }

    pub async fn get_all_component_states(&self) -> HashMap<String, ComponentState> {
        self.component_states.lock().await.clone()
    }

    /// True when every registered component reports `Running`
    pub async fn all_running(&self) -> bool {
        let states = self.component_states.lock().await;
        !states.is_empty() && states.values().all(|s| *s == ComponentState::Running)
    }
}
