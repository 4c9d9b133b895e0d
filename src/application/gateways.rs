use crate::domain::config::normalize_gateway_code;
use crate::domain::ports::GatewayAdapterRef;
use std::collections::HashMap;

/// Gateway adapters keyed by their normalized code.
#[derive(Default, Clone)]
pub struct GatewayRegistry {
    adapters: HashMap<String, GatewayAdapterRef>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, adapter: GatewayAdapterRef) -> Self {
        self.register(adapter);
        self
    }

    pub fn register(&mut self, adapter: GatewayAdapterRef) {
        self.adapters
            .insert(normalize_gateway_code(adapter.code()), adapter);
    }

    pub fn get(&self, code: &str) -> Option<&GatewayAdapterRef> {
        self.adapters.get(&normalize_gateway_code(code))
    }

    pub fn codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }
}
