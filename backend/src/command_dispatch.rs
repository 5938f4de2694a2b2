use neobot_shared::{CommandToken, ControlEvent};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Active(CommandToken),
}

/// Turns directional-pad presses and releases into outbound command tokens.
///
/// A release always emits STP, even if no press was seen. A press while
/// another token is active replaces it without an intervening STP.
pub struct CommandDispatcher {
    state: DispatchState,
    out_tx: mpsc::Sender<CommandToken>,
}

impl CommandDispatcher {
    pub fn new(out_tx: mpsc::Sender<CommandToken>) -> Self {
        Self {
            state: DispatchState::Idle,
            out_tx,
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn handle(&mut self, event: ControlEvent) -> CommandToken {
        match event {
            ControlEvent::Press(token) => self.press(token),
            ControlEvent::Release => self.release(),
        }
    }

    pub fn press(&mut self, token: CommandToken) -> CommandToken {
        if let DispatchState::Active(prev) = self.state {
            if prev != token {
                tracing::debug!(%prev, %token, "overriding active command");
            }
        }
        self.state = match token {
            CommandToken::Stp => DispatchState::Idle,
            other => DispatchState::Active(other),
        };
        self.emit(token)
    }

    pub fn release(&mut self) -> CommandToken {
        self.state = DispatchState::Idle;
        self.emit(CommandToken::Stp)
    }

    fn emit(&self, token: CommandToken) -> CommandToken {
        if let Err(e) = self.out_tx.try_send(token) {
            tracing::warn!(%token, "dropping command, outbound queue unavailable: {e}");
        }
        token
    }
}
