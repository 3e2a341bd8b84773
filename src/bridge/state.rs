//! Host-side projection of the wallet's connection state.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::methods::events;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletState {
    pub connected: bool,
    pub address: Option<String>,
    pub chain_id: Option<String>,
    pub authenticated: bool,
}

impl WalletState {
    /// Fold one wallet event into the snapshot. Returns whether anything changed.
    pub fn apply_event(&mut self, event: &str, data: &Value) -> bool {
        let before = self.clone();
        match event {
            events::CONNECT => {
                self.connected = true;
                if let Some(chain_id) = data.get("chainId").and_then(Value::as_str) {
                    self.chain_id = Some(chain_id.to_string());
                }
            }
            events::DISCONNECT => *self = WalletState::default(),
            events::ACCOUNTS_CHANGED => {
                self.address = first_account(data);
                if self.address.is_none() {
                    self.connected = false;
                }
            }
            events::CHAIN_CHANGED => {
                if let Some(chain_id) = data.as_str().or_else(|| data.get("chainId").and_then(Value::as_str)) {
                    self.chain_id = Some(chain_id.to_string());
                }
            }
            events::AUTHENTICATED => self.authenticated = true,
            events::LOCKED => {
                self.authenticated = false;
                self.connected = false;
                self.address = None;
            }
            _ => {}
        }
        *self != before
    }

    /// Apply an `eth_requestAccounts` / `eth_chainId` result pair.
    pub(crate) fn apply_connect(&mut self, accounts: &Value, chain_id: Option<&str>) {
        self.address = first_account(accounts);
        self.connected = self.address.is_some();
        self.authenticated = self.connected || self.authenticated;
        if let Some(chain_id) = chain_id {
            self.chain_id = Some(chain_id.to_string());
        }
    }
}

fn first_account(data: &Value) -> Option<String> {
    data.as_array()
        .and_then(|a| a.first())
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_drive_the_snapshot() {
        let mut state = WalletState::default();
        assert!(state.apply_event(events::AUTHENTICATED, &json!({"userId": "u1"})));
        assert!(state.apply_event(events::CONNECT, &json!({"chainId": "0x1"})));
        assert!(state.apply_event(events::ACCOUNTS_CHANGED, &json!(["0xabc"])));
        assert!(state.apply_event(events::CHAIN_CHANGED, &json!("0x89")));
        assert_eq!(
            state,
            WalletState {
                connected: true,
                address: Some("0xabc".into()),
                chain_id: Some("0x89".into()),
                authenticated: true,
            }
        );

        assert!(!state.apply_event("somethingElse", &json!({})));
        assert!(state.apply_event(events::DISCONNECT, &Value::Null));
        assert_eq!(state, WalletState::default());
    }

    #[test]
    fn empty_accounts_means_disconnected() {
        let mut state = WalletState { connected: true, address: Some("0x1".into()), ..Default::default() };
        state.apply_event(events::ACCOUNTS_CHANGED, &json!([]));
        assert!(!state.connected);
        assert_eq!(state.address, None);
    }
}
