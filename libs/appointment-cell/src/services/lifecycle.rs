// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, info, warn};

use crate::models::{AppointmentError, AppointmentStatus};

/// Owns the appointment state machine:
/// pending -> approved -> completed, pending -> declined.
/// Declined and completed are terminal.
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        let valid_transitions = self.get_valid_transitions(current_status);

        if !valid_transitions.contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition(current_status));
        }

        info!("Status transition validated: {} -> {}", current_status, new_status);
        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Pending => vec![
                AppointmentStatus::Approved,
                AppointmentStatus::Declined,
            ],
            AppointmentStatus::Approved => vec![
                AppointmentStatus::Completed,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::Declined => vec![],
            AppointmentStatus::Completed => vec![],
        }
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}
