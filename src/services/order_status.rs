//! Order lifecycle state machine.
//!
//! ```text
//! pending ──► processing ──► shipped ──► delivered
//!    │             │
//!    └─────────────┴──► canceled
//! ```

use crate::entities::OrderStatus;
use crate::errors::ServiceError;

/// Outcome of a requested status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Requested status equals the current one; nothing to write.
    Unchanged,
    /// Move from `from` to `to`.
    Apply { from: OrderStatus, to: OrderStatus },
}

/// Statuses reachable in one step from `from`.
pub fn allowed_next(from: OrderStatus) -> &'static [OrderStatus] {
    use crate::entities::OrderStatus::*;
    match from {
        Pending => &[Processing, Canceled],
        Processing => &[Shipped, Canceled],
        Shipped => &[Delivered],
        Delivered | Canceled => &[],
    }
}

pub fn is_allowed(from: OrderStatus, to: OrderStatus) -> bool {
    allowed_next(from).contains(&to)
}

/// Validates a change of status against the transition table.
pub fn plan_transition(from: OrderStatus, to: OrderStatus) -> Result<Transition, ServiceError> {
    if from == to {
        return Ok(Transition::Unchanged);
    }
    if is_allowed(from, to) {
        return Ok(Transition::Apply { from, to });
    }
    Err(ServiceError::InvalidStatus(format!(
        "cannot move order from {} to {}",
        from, to
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;
    use crate::entities::OrderStatus::*;

    #[rstest]
    #[case(Pending, Processing)]
    #[case(Pending, Canceled)]
    #[case(Processing, Shipped)]
    #[case(Processing, Canceled)]
    #[case(Shipped, Delivered)]
    fn forward_moves_are_allowed(#[case] from: OrderStatus, #[case] to: OrderStatus) {
        assert_eq!(
            plan_transition(from, to).unwrap(),
            Transition::Apply { from, to }
        );
    }

    #[rstest]
    #[case(Pending, Shipped)]
    #[case(Pending, Delivered)]
    #[case(Processing, Pending)]
    #[case(Shipped, Canceled)]
    #[case(Shipped, Processing)]
    #[case(Delivered, Canceled)]
    #[case(Delivered, Pending)]
    #[case(Canceled, Processing)]
    fn illegal_moves_are_rejected(#[case] from: OrderStatus, #[case] to: OrderStatus) {
        assert_matches!(
            plan_transition(from, to),
            Err(ServiceError::InvalidStatus(_))
        );
    }

    #[test]
    fn same_status_is_a_no_op() {
        for status in [Pending, Processing, Shipped, Delivered, Canceled] {
            assert_eq!(plan_transition(status, status).unwrap(), Transition::Unchanged);
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        assert!(allowed_next(Delivered).is_empty());
        assert!(allowed_next(Canceled).is_empty());
        assert!(Delivered.is_terminal() && Canceled.is_terminal());
    }
}
