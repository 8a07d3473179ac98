//! Crate-level error taxonomy for fleetrun.

use crate::config::ConfigError;
use crate::inventory::InventoryError;
use crate::launcher::LaunchError;
use crate::session::RunError;

/// Any failure surfaced by fleet-core operations.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("launch error: {0}")]
    Launch(#[from] LaunchError),

    #[error("run error: {0}")]
    Run(#[from] RunError),

    #[error("storage error: {0}")]
    Storage(#[from] fleet_state::StorageError),

    #[error("state error: {0}")]
    State(#[from] fleet_state::StateError),
}

impl FleetError {
    /// Whether the failure was a denied write, as opposed to a run failure.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            FleetError::Inventory(e) => e.is_permission_denied(),
            FleetError::Storage(fleet_state::StorageError::PermissionDenied { .. }) => true,
            _ => false,
        }
    }
}

/// Result type for fleet-core operations.
pub type Result<T> = std::result::Result<T, FleetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_layer() {
        let err: FleetError = RunError::InvalidRequest {
            field: "playbook_id",
            reason: "must not be empty".to_string(),
        }
        .into();
        assert!(err.to_string().starts_with("run error: invalid run request"));
    }

    #[test]
    fn permission_denied_is_detected_across_layers() {
        let inv: FleetError = InventoryError::PermissionDenied {
            path: "/etc/ansible/hosts".to_string(),
        }
        .into();
        assert!(inv.is_permission_denied());

        let storage: FleetError = fleet_state::StorageError::PermissionDenied {
            path: "/etc/ansible/playbooks/site.yml".to_string(),
        }
        .into();
        assert!(storage.is_permission_denied());

        let launch: FleetError = LaunchError::ExecutableNotFound {
            program: "ansible-playbook".to_string(),
        }
        .into();
        assert!(!launch.is_permission_denied());
    }
}
