//! Connection lifecycle state machine.
//!
//! Pure transition logic only: the machine decides which lifecycle edges are
//! legal, while the monitor performs the actual transport calls and feeds the
//! results back in as inputs. Keeping it side-effect-free makes every edge
//! testable without a radio.

use crate::types::{ConnectionStatus, FailReason};
use log::{info, warn};
use statig::prelude::*;

/// Inputs fed to the lifecycle machine by the session driver.
#[derive(Debug, Clone)]
pub enum LinkInput {
    /// Consumer asked to connect (or retry after a failure).
    ConnectRequested,
    /// Device chooser resolved with a device.
    DeviceSelected,
    /// Transport link is up and service/characteristic resolved.
    LinkOpened,
    /// Weight notifications enabled.
    Subscribed,
    /// Any handshake step gave up.
    HandshakeFailed(FailReason),
    /// Consumer asked to disconnect (also cancels a pending handshake).
    DisconnectRequested,
    /// Best-effort teardown finished.
    TeardownComplete,
    /// The scale dropped the link on its own.
    LinkLost,
}

/// Data shared across states. Only carries what the public status needs.
#[derive(Debug, Default)]
pub struct LinkContext {
    last_failure: Option<FailReason>,
}

#[derive(Debug, Default)]
pub struct LinkMachine;

#[state_machine(
    initial = "State::idle()",
    state(derive(Debug)),
    on_transition = "Self::on_transition"
)]
impl LinkMachine {
    #[state]
    fn idle(context: &mut LinkContext, event: &LinkInput) -> Response<State> {
        use Response::*;

        match event {
            LinkInput::ConnectRequested => {
                context.last_failure = None;
                Transition(State::discovering())
            }
            _ => Handled,
        }
    }

    #[state]
    fn discovering(context: &mut LinkContext, event: &LinkInput) -> Response<State> {
        use Response::*;

        match event {
            LinkInput::DeviceSelected => Transition(State::connecting()),
            LinkInput::HandshakeFailed(reason) => {
                context.last_failure = Some(*reason);
                Transition(State::failed())
            }
            // Nothing opened yet; a cancel lands straight back in idle.
            LinkInput::DisconnectRequested => Transition(State::idle()),
            _ => Handled,
        }
    }

    #[state]
    fn connecting(context: &mut LinkContext, event: &LinkInput) -> Response<State> {
        use Response::*;

        match event {
            LinkInput::LinkOpened => Transition(State::subscribing()),
            LinkInput::HandshakeFailed(reason) => {
                context.last_failure = Some(*reason);
                Transition(State::failed())
            }
            LinkInput::DisconnectRequested => Transition(State::disconnecting()),
            _ => Handled,
        }
    }

    #[state]
    fn subscribing(context: &mut LinkContext, event: &LinkInput) -> Response<State> {
        use Response::*;

        match event {
            LinkInput::Subscribed => Transition(State::active()),
            LinkInput::HandshakeFailed(reason) => {
                context.last_failure = Some(*reason);
                Transition(State::failed())
            }
            LinkInput::DisconnectRequested => Transition(State::disconnecting()),
            _ => Handled,
        }
    }

    #[state]
    fn active(event: &LinkInput) -> Response<State> {
        use Response::*;

        match event {
            LinkInput::DisconnectRequested => Transition(State::disconnecting()),
            LinkInput::LinkLost => Transition(State::idle()),
            LinkInput::ConnectRequested => {
                warn!("connect requested while the link is already active");
                Handled
            }
            _ => Handled,
        }
    }

    #[state]
    fn disconnecting(event: &LinkInput) -> Response<State> {
        use Response::*;

        match event {
            // Teardown is best-effort and always lands in idle.
            LinkInput::TeardownComplete => Transition(State::idle()),
            // Link dropping mid-teardown changes nothing.
            LinkInput::LinkLost => Handled,
            _ => Handled,
        }
    }

    #[state]
    fn failed(context: &mut LinkContext, event: &LinkInput) -> Response<State> {
        use Response::*;

        match event {
            LinkInput::ConnectRequested => {
                context.last_failure = None;
                Transition(State::discovering())
            }
            _ => Handled,
        }
    }

    fn on_transition(&mut self, source: &State, target: &State) {
        info!("scale link: {:?} -> {:?}", source, target);
    }
}

/// Thin owner of the machine plus its context, mapping the internal state to
/// the public `ConnectionStatus`.
pub struct LinkController {
    machine: statig::prelude::StateMachine<LinkMachine>,
    context: LinkContext,
}

impl LinkController {
    pub fn new() -> Self {
        Self {
            machine: LinkMachine::default().state_machine(),
            context: LinkContext::default(),
        }
    }

    /// Feed one input and return the resulting status. Illegal inputs for
    /// the current state are ignored and leave the status unchanged.
    pub fn handle(&mut self, input: LinkInput) -> ConnectionStatus {
        let _ = self.machine.handle_with_context(&input, &mut self.context);
        self.status()
    }

    pub fn status(&self) -> ConnectionStatus {
        match self.machine.state() {
            State::Idle {} => ConnectionStatus::Idle,
            State::Discovering {} => ConnectionStatus::Discovering,
            State::Connecting {} => ConnectionStatus::Connecting,
            State::Subscribing {} => ConnectionStatus::Subscribing,
            State::Active {} => ConnectionStatus::Active,
            State::Disconnecting {} => ConnectionStatus::Disconnecting,
            State::Failed {} => ConnectionStatus::Failed(
                self.context
                    .last_failure
                    .unwrap_or(FailReason::ConnectFailed),
            ),
        }
    }
}

impl Default for LinkController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drive(controller: &mut LinkController, inputs: &[LinkInput]) -> ConnectionStatus {
        let mut status = controller.status();
        for input in inputs {
            status = controller.handle(input.clone());
        }
        status
    }

    #[test]
    fn starts_idle() {
        assert_eq!(LinkController::new().status(), ConnectionStatus::Idle);
    }

    #[test]
    fn happy_path_reaches_active_in_order() {
        let mut link = LinkController::new();
        assert_eq!(
            link.handle(LinkInput::ConnectRequested),
            ConnectionStatus::Discovering
        );
        assert_eq!(
            link.handle(LinkInput::DeviceSelected),
            ConnectionStatus::Connecting
        );
        assert_eq!(
            link.handle(LinkInput::LinkOpened),
            ConnectionStatus::Subscribing
        );
        assert_eq!(link.handle(LinkInput::Subscribed), ConnectionStatus::Active);
    }

    #[test]
    fn active_is_unreachable_without_the_full_handshake() {
        let mut link = LinkController::new();
        // Out-of-order inputs are ignored from idle.
        assert_eq!(link.handle(LinkInput::Subscribed), ConnectionStatus::Idle);
        assert_eq!(link.handle(LinkInput::LinkOpened), ConnectionStatus::Idle);
        assert_eq!(
            link.handle(LinkInput::DeviceSelected),
            ConnectionStatus::Idle
        );

        // Skipping a step from discovering does not advance either.
        link.handle(LinkInput::ConnectRequested);
        assert_eq!(
            link.handle(LinkInput::Subscribed),
            ConnectionStatus::Discovering
        );
        assert_eq!(
            link.handle(LinkInput::LinkOpened),
            ConnectionStatus::Discovering
        );
    }

    #[test]
    fn connect_while_active_is_a_no_op() {
        let mut link = LinkController::new();
        drive(
            &mut link,
            &[
                LinkInput::ConnectRequested,
                LinkInput::DeviceSelected,
                LinkInput::LinkOpened,
                LinkInput::Subscribed,
            ],
        );
        assert_eq!(
            link.handle(LinkInput::ConnectRequested),
            ConnectionStatus::Active
        );
    }

    #[test]
    fn handshake_failures_preserve_the_reason() {
        let mut link = LinkController::new();
        link.handle(LinkInput::ConnectRequested);
        assert_eq!(
            link.handle(LinkInput::HandshakeFailed(FailReason::UserCancelled)),
            ConnectionStatus::Failed(FailReason::UserCancelled)
        );

        // Retry re-enters discovery, clearing the failure.
        assert_eq!(
            link.handle(LinkInput::ConnectRequested),
            ConnectionStatus::Discovering
        );
        link.handle(LinkInput::DeviceSelected);
        assert_eq!(
            link.handle(LinkInput::HandshakeFailed(FailReason::ServiceNotFound)),
            ConnectionStatus::Failed(FailReason::ServiceNotFound)
        );
    }

    #[test]
    fn subscribe_failure_is_terminal_for_the_attempt() {
        let mut link = LinkController::new();
        drive(
            &mut link,
            &[
                LinkInput::ConnectRequested,
                LinkInput::DeviceSelected,
                LinkInput::LinkOpened,
            ],
        );
        assert_eq!(
            link.handle(LinkInput::HandshakeFailed(FailReason::SubscribeFailed)),
            ConnectionStatus::Failed(FailReason::SubscribeFailed)
        );
    }

    #[test]
    fn link_loss_while_active_returns_to_idle() {
        let mut link = LinkController::new();
        drive(
            &mut link,
            &[
                LinkInput::ConnectRequested,
                LinkInput::DeviceSelected,
                LinkInput::LinkOpened,
                LinkInput::Subscribed,
            ],
        );
        assert_eq!(link.handle(LinkInput::LinkLost), ConnectionStatus::Idle);
    }

    #[test]
    fn explicit_disconnect_runs_through_teardown() {
        let mut link = LinkController::new();
        drive(
            &mut link,
            &[
                LinkInput::ConnectRequested,
                LinkInput::DeviceSelected,
                LinkInput::LinkOpened,
                LinkInput::Subscribed,
            ],
        );
        assert_eq!(
            link.handle(LinkInput::DisconnectRequested),
            ConnectionStatus::Disconnecting
        );
        // A link-loss callback racing the teardown changes nothing.
        assert_eq!(
            link.handle(LinkInput::LinkLost),
            ConnectionStatus::Disconnecting
        );
        assert_eq!(
            link.handle(LinkInput::TeardownComplete),
            ConnectionStatus::Idle
        );
        // Further disconnects are no-ops.
        assert_eq!(
            link.handle(LinkInput::DisconnectRequested),
            ConnectionStatus::Idle
        );
    }

    #[test]
    fn cancel_during_discovery_returns_to_idle() {
        let mut link = LinkController::new();
        link.handle(LinkInput::ConnectRequested);
        assert_eq!(
            link.handle(LinkInput::DisconnectRequested),
            ConnectionStatus::Idle
        );
    }
}
