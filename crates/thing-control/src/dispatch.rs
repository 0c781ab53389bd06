//! Action dispatch state machine.
//!
//! Every inbound action moves through a short, fixed life:
//!
//! ```text
//!   ┌──────────┐  alias ok, state read,  ┌───────────┐  actuated and   ┌─────────┐
//!   │ Received │────────────────────────▶│ Validated │────────────────▶│ Applied │
//!   └────┬─────┘  value ok               └─────┬─────┘  persisted      └─────────┘
//!        │                                     │
//!        │ bad alias, lock/sensor failure,     │ persist failed
//!        │ bad value                           │ (no rollback)
//!        ▼                                     ▼
//!   ┌──────────────────────────────────────────────┐
//!   │                   Rejected                   │
//!   └──────────────────────────────────────────────┘
//! ```
//!
//! The indicator is driven before the new state is persisted. If persisting
//! fails afterwards the indicator is left as is and the action is rejected.

use std::sync::Arc;

use thing_core::{PendingAction, TURN_POWER_ACTION};
use thing_store::StateStore;

use crate::error::{ControlError, Result};
use crate::indicator::{Indicator, POWER_ON_COLOR};

/// Where an action is in its dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Decoded, nothing checked yet.
    Received,
    /// Alias, state access and value checked.
    Validated,
    /// Effects carried out.
    Applied,
    /// Refused; the error is reported to the sender.
    Rejected,
}

/// Check if a dispatch state transition is allowed.
#[must_use]
pub const fn is_valid_transition(from: DispatchState, to: DispatchState) -> bool {
    use DispatchState::{Applied, Received, Rejected, Validated};

    matches!(
        (from, to),
        (Received, Validated | Rejected) | (Validated, Applied | Rejected)
    )
}

/// Returns true if no further transition can happen.
#[must_use]
pub const fn is_terminal(state: DispatchState) -> bool {
    matches!(state, DispatchState::Applied | DispatchState::Rejected)
}

fn advance(from: DispatchState, to: DispatchState) -> DispatchState {
    debug_assert!(
        is_valid_transition(from, to),
        "invalid dispatch transition {from:?} -> {to:?}"
    );
    to
}

/// Result of dispatching one action.
#[derive(Debug)]
pub struct DispatchOutcome {
    /// Terminal state reached.
    pub state: DispatchState,
    /// Why the action was rejected, if it was.
    pub error: Option<ControlError>,
}

impl DispatchOutcome {
    /// Returns true if the action was applied.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        matches!(self.state, DispatchState::Applied)
    }

    /// Message to report back for a rejected action.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ControlError::report_message)
    }
}

/// What a validated action will do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    SetPower(bool),
    Nothing,
}

/// Applies inbound actions to the device state and the indicator.
pub struct ActionDispatcher<S: ?Sized, I: ?Sized> {
    store: Arc<S>,
    indicator: Arc<I>,
}

impl<S: ?Sized, I: ?Sized> Clone for ActionDispatcher<S, I> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            indicator: Arc::clone(&self.indicator),
        }
    }
}

impl<S, I> ActionDispatcher<S, I>
where
    S: StateStore + ?Sized,
    I: Indicator + ?Sized,
{
    /// Create a dispatcher over a shared store and indicator.
    #[must_use]
    pub const fn new(store: Arc<S>, indicator: Arc<I>) -> Self {
        Self { store, indicator }
    }

    /// The store actions are applied to.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Run one action to a terminal state.
    pub fn dispatch(&self, action: &PendingAction) -> DispatchOutcome {
        tracing::debug!(
            alias = %action.alias,
            action = %action.action_name,
            value = action.value.type_name(),
            "Dispatching action"
        );

        let mut state = DispatchState::Received;
        let result = self.validate(action).and_then(|effect| {
            state = advance(state, DispatchState::Validated);
            self.apply(effect)
        });

        match result {
            Ok(()) => DispatchOutcome {
                state: advance(state, DispatchState::Applied),
                error: None,
            },
            Err(error) => {
                tracing::warn!(
                    alias = %action.alias,
                    action = %action.action_name,
                    error = %error,
                    "Action rejected"
                );
                DispatchOutcome {
                    state: advance(state, DispatchState::Rejected),
                    error: Some(error),
                }
            }
        }
    }

    fn validate(&self, action: &PendingAction) -> Result<Effect> {
        if !action.targets_device() {
            return Err(ControlError::InvalidAlias(action.alias.clone()));
        }

        // State must be readable before anything is changed.
        self.store.read()?;

        if action.action_name != TURN_POWER_ACTION {
            tracing::debug!(action = %action.action_name, "Unsupported action, ignoring");
            return Ok(Effect::Nothing);
        }

        action
            .value
            .as_bool()
            .map(Effect::SetPower)
            .ok_or_else(|| ControlError::InvalidValue {
                action: action.action_name.clone(),
                found: action.value.type_name(),
            })
    }

    fn apply(&self, effect: Effect) -> Result<()> {
        let Effect::SetPower(power) = effect else {
            return Ok(());
        };

        let actuated = if power {
            self.indicator.turn_on(POWER_ON_COLOR)
        } else {
            self.indicator.turn_off()
        };
        if let Err(e) = actuated {
            tracing::warn!(power, error = %e, "Failed to drive indicator");
        }

        self.store.set_power(power)?;
        tracing::info!(power, "Power state updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::mock::{IndicatorEvent, RecordingIndicator};
    use std::time::Duration;
    use thing_core::{ActionValue, AIR_CONDITIONER_ALIAS};
    use thing_store::{FixedSensor, MutexStateStore, StoreError};

    type Dispatcher = ActionDispatcher<MutexStateStore<FixedSensor>, RecordingIndicator>;

    fn setup(reading: i32) -> (Dispatcher, Arc<MutexStateStore<FixedSensor>>, Arc<RecordingIndicator>) {
        let store = Arc::new(MutexStateStore::new(
            FixedSensor::new(reading),
            Duration::from_millis(50),
        ));
        let indicator = Arc::new(RecordingIndicator::new());
        let dispatcher = ActionDispatcher::new(Arc::clone(&store), Arc::clone(&indicator));
        (dispatcher, store, indicator)
    }

    fn turn_power(value: ActionValue) -> PendingAction {
        PendingAction::new(AIR_CONDITIONER_ALIAS, TURN_POWER_ACTION, value)
    }

    #[test]
    fn transitions() {
        use DispatchState::*;

        assert!(is_valid_transition(Received, Validated));
        assert!(is_valid_transition(Received, Rejected));
        assert!(is_valid_transition(Validated, Applied));
        assert!(is_valid_transition(Validated, Rejected));

        assert!(!is_valid_transition(Received, Applied));
        assert!(!is_valid_transition(Applied, Rejected));
        assert!(!is_valid_transition(Rejected, Validated));

        assert!(is_terminal(Applied));
        assert!(is_terminal(Rejected));
        assert!(!is_terminal(Validated));
    }

    #[test]
    fn turn_power_on_and_off() {
        let (dispatcher, store, indicator) = setup(22_000);

        let outcome = dispatcher.dispatch(&turn_power(ActionValue::Boolean(true)));
        assert!(outcome.succeeded());
        assert!(store.read().unwrap().power);

        let outcome = dispatcher.dispatch(&turn_power(ActionValue::Boolean(false)));
        assert!(outcome.succeeded());
        assert!(!store.read().unwrap().power);

        assert_eq!(
            indicator.events(),
            vec![IndicatorEvent::On(POWER_ON_COLOR), IndicatorEvent::Off]
        );
    }

    #[test]
    fn wrong_alias_is_rejected_without_effects() {
        let (dispatcher, store, indicator) = setup(22_000);
        let reads_before = store.sensor().read_count();

        let action = PendingAction::new("HeaterAlias", TURN_POWER_ACTION, ActionValue::Boolean(true));
        let outcome = dispatcher.dispatch(&action);

        assert_eq!(outcome.state, DispatchState::Rejected);
        assert_eq!(outcome.error_message().as_deref(), Some("invalid alias"));
        assert_eq!(store.sensor().read_count(), reads_before);
        assert!(!store.read().unwrap().power);
        assert!(indicator.events().is_empty());
    }

    #[test]
    fn non_boolean_value_is_rejected_without_effects() {
        let (dispatcher, store, indicator) = setup(22_000);

        for value in [
            ActionValue::Integer(1),
            ActionValue::String("true".into()),
            ActionValue::Object("{}".into()),
        ] {
            let outcome = dispatcher.dispatch(&turn_power(value));
            assert_eq!(outcome.state, DispatchState::Rejected);
            assert_eq!(outcome.error_message().as_deref(), Some("invalid value"));
        }

        assert!(!store.read().unwrap().power);
        assert!(indicator.events().is_empty());
    }

    #[test]
    fn unsupported_action_is_applied_as_no_op() {
        let (dispatcher, store, indicator) = setup(22_000);
        store.set_power(true).unwrap();

        let action = PendingAction::new(
            AIR_CONDITIONER_ALIAS,
            "setPresetTemperature",
            ActionValue::Integer(25),
        );
        let outcome = dispatcher.dispatch(&action);

        assert!(outcome.succeeded());
        assert!(outcome.error.is_none());
        assert!(store.read().unwrap().power);
        assert!(indicator.events().is_empty());
    }

    #[test]
    fn sensor_failure_rejects_before_actuation() {
        let (dispatcher, store, indicator) = setup(-9997);

        let outcome = dispatcher.dispatch(&turn_power(ActionValue::Boolean(true)));
        assert_eq!(outcome.state, DispatchState::Rejected);
        assert!(matches!(
            outcome.error,
            Some(ControlError::Store(StoreError::Sensor { code: -9997 }))
        ));
        assert!(indicator.events().is_empty());

        store.sensor().set(20_000);
        assert!(!store.read().unwrap().power);
    }

    #[test]
    fn lock_contention_rejects() {
        let (dispatcher, store, indicator) = setup(22_000);

        let outcome = store.hold_lock(|| dispatcher.dispatch(&turn_power(ActionValue::Boolean(true))));
        assert_eq!(outcome.state, DispatchState::Rejected);
        assert_eq!(outcome.error_message().as_deref(), Some("fail to lock."));
        assert!(indicator.events().is_empty());
        assert!(!store.read().unwrap().power);
    }

    #[test]
    fn indicator_failure_does_not_block_persist() {
        let store = Arc::new(MutexStateStore::new(
            FixedSensor::new(22_000),
            Duration::from_millis(50),
        ));
        let indicator = Arc::new(RecordingIndicator::failing());
        let dispatcher = ActionDispatcher::new(Arc::clone(&store), indicator);

        let outcome = dispatcher.dispatch(&turn_power(ActionValue::Boolean(true)));
        assert!(outcome.succeeded());
        assert!(store.read().unwrap().power);
    }
}
