//! Dispatch table from action type to remote operation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::action::{ActionType, QueuedAction};
use crate::error::DispatchError;

/// The remote effect behind one action type.
#[async_trait]
pub trait RemoteOperation: Send + Sync {
    /// Perform the operation with the action's payload.
    async fn call(&self, payload: &serde_json::Value) -> Result<(), DispatchError>;
}

/// Adapts an async closure into a [`RemoteOperation`].
pub struct FnRemote<F>(pub F);

#[async_trait]
impl<F, Fut> RemoteOperation for FnRemote<F>
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), DispatchError>> + Send,
{
    async fn call(&self, payload: &serde_json::Value) -> Result<(), DispatchError> {
        (self.0)(payload.clone()).await
    }
}

/// Flat mapping from action type to the call that performs it.
#[derive(Clone, Default)]
pub struct DispatchTable {
    routes: HashMap<ActionType, Arc<dyn RemoteOperation>>,
}

impl DispatchTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `operation` for `action_type`, replacing any previous entry.
    ///
    /// Registrations for [`ActionType::Other`] are ignored: unknown types are
    /// always a terminal failure.
    pub fn register(&mut self, action_type: ActionType, operation: Arc<dyn RemoteOperation>) {
        if !action_type.is_known() {
            tracing::warn!(action_type = %action_type, "ignoring registration for unknown action type");
            return;
        }
        self.routes.insert(action_type, operation);
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, action_type: ActionType, operation: impl RemoteOperation + 'static) -> Self {
        self.register(action_type, Arc::new(operation));
        self
    }

    /// Register the same operation for every known action type.
    #[must_use]
    pub fn with_all(mut self, operation: Arc<dyn RemoteOperation>) -> Self {
        for action_type in ActionType::KNOWN {
            self.register(action_type, operation.clone());
        }
        self
    }

    /// Whether a call is registered for `action_type`.
    #[must_use]
    pub fn handles(&self, action_type: &ActionType) -> bool {
        self.route(action_type).is_ok()
    }

    /// Look up the operation for `action_type`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnknownType`] for types this build does not
    /// know and [`DispatchError::Unregistered`] for known types with no entry.
    pub fn route(&self, action_type: &ActionType) -> Result<&Arc<dyn RemoteOperation>, DispatchError> {
        match action_type {
            ActionType::Other(name) => Err(DispatchError::UnknownType(name.clone())),
            ActionType::EmergencyAlert
            | ActionType::CheckIn
            | ActionType::CreateSpot
            | ActionType::SubmitRating
            | ActionType::SubmitComment
            | ActionType::SendMessage
            | ActionType::UpdateProfile
            | ActionType::ToggleFavorite
            | ActionType::SubmitReport => self
                .routes
                .get(action_type)
                .ok_or_else(|| DispatchError::Unregistered(action_type.clone())),
        }
    }

    /// Perform `action` against its remote operation.
    ///
    /// # Errors
    ///
    /// Returns the routing failure or whatever the remote operation reports.
    pub async fn dispatch(&self, action: &QueuedAction) -> Result<(), DispatchError> {
        let operation = self.route(&action.action_type)?;
        operation.call(&action.data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn ok_remote() -> FnRemote<impl Fn(serde_json::Value) -> std::future::Ready<Result<(), DispatchError>>> {
        FnRemote(|_: serde_json::Value| std::future::ready(Ok(())))
    }

    #[tokio::test]
    async fn test_dispatch_registered_type() {
        let table = DispatchTable::new().with(ActionType::CheckIn, ok_remote());
        let action = QueuedAction::new(ActionType::CheckIn, json!({"spot": 1}), Utc::now());

        assert!(table.dispatch(&action).await.is_ok());
        assert!(table.handles(&ActionType::CheckIn));
        assert!(!table.handles(&ActionType::CreateSpot));
    }

    #[tokio::test]
    async fn test_unknown_type_is_terminal() {
        let mut table = DispatchTable::new();
        table.register(ActionType::Other("HOLOGRAM".to_string()), Arc::new(ok_remote()));
        let action = QueuedAction::new(ActionType::from("HOLOGRAM"), json!({}), Utc::now());

        let err = table.dispatch(&action).await.unwrap_err();
        assert_eq!(err, DispatchError::UnknownType("HOLOGRAM".to_string()));
        assert!(err.is_terminal());
    }

    #[tokio::test]
    async fn test_unregistered_known_type() {
        let table = DispatchTable::new();
        let action = QueuedAction::new(ActionType::SubmitReport, json!({}), Utc::now());

        let err = table.dispatch(&action).await.unwrap_err();
        assert_eq!(err, DispatchError::Unregistered(ActionType::SubmitReport));
    }

    #[tokio::test]
    async fn test_payload_reaches_operation() {
        let table = DispatchTable::new().with(
            ActionType::SendMessage,
            FnRemote(|payload: serde_json::Value| async move {
                if payload["text"] == "hi" {
                    Ok(())
                } else {
                    Err(DispatchError::Terminal("bad payload".to_string()))
                }
            }),
        );

        let good = QueuedAction::new(ActionType::SendMessage, json!({"text": "hi"}), Utc::now());
        let bad = QueuedAction::new(ActionType::SendMessage, json!({"text": "?"}), Utc::now());
        assert!(table.dispatch(&good).await.is_ok());
        assert!(table.dispatch(&bad).await.is_err());
    }

    #[tokio::test]
    async fn test_with_all_covers_known_types() {
        let table = DispatchTable::new().with_all(Arc::new(ok_remote()));
        for action_type in ActionType::KNOWN {
            assert!(table.handles(&action_type));
        }
    }
}
