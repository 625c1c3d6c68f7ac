//! Server-side session: the per-connection agent that processes the C→S
//! command stream.
//!
//! One `HostSession` per transport connection. It owns the auth automaton
//! and the server-side interaction gates, consults the shared identity store
//! and token registry, and enforces the per-connection command-rate ceiling.
//! Commands take effect strictly in wire order; each call returns the
//! replies to write back plus an optional application-level event.

use std::time::Duration;

use ed25519_dalek::VerifyingKey;
use glam::Vec3;

use hackvr_protocol::{
    FrameEvent, HostCommand, IntentId, ObjectId, SessionToken, Tag, TapKind, UserId,
    ViewerCommand,
};

use crate::auth::{AuthEvent, AuthMachine, REJECTED};
use crate::identity::IdentityStore;
use crate::token::{Origin, ResumeError, SessionRegistry};

/// Something the world/application layer reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Chat {
        user: UserId,
        message: String,
    },
    Tap {
        user: UserId,
        obj: ObjectId,
        kind: TapKind,
        tag: Tag,
    },
    Tell {
        user: UserId,
        obj: ObjectId,
        text: String,
    },
    Intent {
        intent: IntentId,
        view_dir: Vec3,
    },
    Raycast {
        origin: Vec3,
        dir: Vec3,
    },
    RaycastCancelled,
    Input {
        text: String,
    },
    UserChanged(UserId),
    /// The client asked to resume; restoration policy beyond the registry
    /// check is the application's call (it may still demand re-auth).
    ResumeRequested {
        token: SessionToken,
        outcome: Result<UserId, ResumeError>,
    },
}

/// Result of feeding one framer event through the session.
#[derive(Debug, Default)]
pub struct HostOutput {
    /// Lines to send back, in order.
    pub replies: Vec<ViewerCommand>,
    pub event: Option<HostEvent>,
}

impl HostOutput {
    fn reply(cmd: ViewerCommand) -> Self {
        Self {
            replies: vec![cmd],
            event: None,
        }
    }

    fn event(event: HostEvent) -> Self {
        Self {
            replies: Vec::new(),
            event: Some(event),
        }
    }

    fn nothing() -> Self {
        Self::default()
    }
}

/// Sliding one-second command-rate window.
#[derive(Debug)]
struct RateWindow {
    cap: u32,
    window_start: Duration,
    count: u32,
}

impl RateWindow {
    fn new(cap: u32) -> Self {
        Self {
            cap,
            window_start: Duration::ZERO,
            count: 0,
        }
    }

    fn admit(&mut self, now: Duration) -> bool {
        if now.saturating_sub(self.window_start) >= Duration::from_secs(1) {
            self.window_start = now;
            self.count = 0;
        }
        self.count += 1;
        self.count <= self.cap
    }
}

/// Per-connection server agent.
#[derive(Debug)]
pub struct HostSession {
    auth: AuthMachine,
    origin: Origin,
    rate: RateWindow,
    /// Set while the server has an outstanding `request-input`.
    awaiting_input: bool,
    /// Set while the server has an outstanding `raycast-request`.
    awaiting_raycast: bool,
}

impl HostSession {
    pub fn new(origin: Origin, commands_per_second: u32) -> Self {
        Self {
            auth: AuthMachine::new(),
            origin,
            rate: RateWindow::new(commands_per_second),
            awaiting_input: false,
            awaiting_raycast: false,
        }
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn effective_user(&self) -> &UserId {
        self.auth.effective_user()
    }

    // -----------------------------------------------------------------------
    // Server-initiated commands that move session state
    // -----------------------------------------------------------------------

    /// Start the auth cycle; send the returned command.
    pub fn request_user(&mut self, prompt: Option<String>) -> ViewerCommand {
        self.auth.request_user();
        ViewerCommand::RequestUser { prompt }
    }

    /// Open text-input mode; send the returned command.
    pub fn request_input(&mut self, prompt: String, default: Option<String>) -> ViewerCommand {
        self.awaiting_input = true;
        ViewerCommand::RequestInput { prompt, default }
    }

    /// Close text-input mode; send the returned command.
    pub fn cancel_input(&mut self) -> ViewerCommand {
        self.awaiting_input = false;
        ViewerCommand::CancelInput
    }

    /// Open raycast mode; send the returned command.
    pub fn raycast_request(&mut self) -> ViewerCommand {
        self.awaiting_raycast = true;
        ViewerCommand::RaycastRequest
    }

    /// Close raycast mode from the server side; send the returned command.
    pub fn raycast_cancel(&mut self) -> ViewerCommand {
        self.awaiting_raycast = false;
        ViewerCommand::RaycastCancel
    }

    /// Mint and register a token for this connection; send the returned
    /// command.
    pub fn announce_session(
        &mut self,
        registry: &mut SessionRegistry,
        now: Duration,
        lifetime: Option<Duration>,
    ) -> ViewerCommand {
        let token = registry.announce(
            self.origin.clone(),
            self.auth.effective_user().clone(),
            now,
            lifetime,
        );
        ViewerCommand::AnnounceSession {
            token,
            lifetime: lifetime.map(|value| value.as_secs()),
        }
    }

    /// Process a token the client attached during establishment, as if
    /// `resume-session` were its first command.
    pub fn resume_from_hello(
        &mut self,
        token: SessionToken,
        registry: &SessionRegistry,
        now: Duration,
    ) -> HostEvent {
        self.resume(token, registry, now)
    }

    // -----------------------------------------------------------------------
    // Inbound stream
    // -----------------------------------------------------------------------

    /// Feed one framer event. Violations and malformed or over-rate commands
    /// are dropped per the optimistic regime.
    pub fn handle_event(
        &mut self,
        event: FrameEvent,
        registry: &SessionRegistry,
        identities: &IdentityStore,
        now: Duration,
    ) -> HostOutput {
        let frame = match event {
            FrameEvent::Frame(frame) => frame,
            FrameEvent::Violation(violation) => {
                log::debug!("dropping line after framing violation: {violation:?}");
                return HostOutput::nothing();
            }
        };
        if !self.rate.admit(now) {
            log::warn!("command rate exceeded, dropping {:?}", frame.name);
            return HostOutput::nothing();
        }
        let cmd = match HostCommand::parse(&frame) {
            Ok(cmd) => cmd,
            Err(err) => {
                log::debug!("dropping command: {err}");
                return HostOutput::nothing();
            }
        };
        self.handle_command(cmd, registry, identities, now)
    }

    fn handle_command(
        &mut self,
        cmd: HostCommand,
        registry: &SessionRegistry,
        identities: &IdentityStore,
        now: Duration,
    ) -> HostOutput {
        match cmd {
            HostCommand::Hello { .. } => {
                log::debug!("hackvr-hello after establishment, dropping");
                HostOutput::nothing()
            }
            HostCommand::Chat { message } => HostOutput::event(HostEvent::Chat {
                user: self.auth.effective_user().clone(),
                message,
            }),
            HostCommand::SetUser { user } => match self.auth.on_set_user(user, now) {
                Ok(AuthEvent::AcceptAnonymous) => {
                    let mut output = HostOutput::reply(ViewerCommand::AcceptUser {
                        user: UserId::anonymous(),
                    });
                    output.event = Some(HostEvent::UserChanged(UserId::anonymous()));
                    output
                }
                Ok(AuthEvent::Challenge { user, nonce }) => {
                    HostOutput::reply(ViewerCommand::RequestAuthentication { user, nonce })
                }
                Ok(other) => {
                    log::debug!("unexpected auth event {other:?}");
                    HostOutput::nothing()
                }
                Err(_) => {
                    log::debug!("set-user out of order, dropping");
                    HostOutput::nothing()
                }
            },
            HostCommand::Authenticate { user, signature } => {
                let lookup = |user: &UserId| -> Option<VerifyingKey> { identities.lookup(user) };
                match self.auth.on_authenticate(&user, &signature, lookup, now) {
                    Ok(AuthEvent::Accepted(user)) => {
                        let mut output =
                            HostOutput::reply(ViewerCommand::AcceptUser { user: user.clone() });
                        output.event = Some(HostEvent::UserChanged(user));
                        output
                    }
                    Ok(AuthEvent::Rejected(user)) => {
                        let mut output = HostOutput::reply(ViewerCommand::RejectUser {
                            user,
                            reason: Some(REJECTED.to_string()),
                        });
                        output.event = Some(HostEvent::UserChanged(UserId::anonymous()));
                        output
                    }
                    Ok(other) => {
                        log::debug!("unexpected auth event {other:?}");
                        HostOutput::nothing()
                    }
                    Err(_) => {
                        log::debug!("authenticate out of order, dropping");
                        HostOutput::nothing()
                    }
                }
            }
            HostCommand::ResumeSession { token } => {
                HostOutput::event(self.resume(token, registry, now))
            }
            HostCommand::SendInput { text } => {
                if !self.awaiting_input {
                    log::debug!("send-input outside text-input mode, dropping");
                    return HostOutput::nothing();
                }
                self.awaiting_input = false;
                HostOutput::event(HostEvent::Input { text })
            }
            HostCommand::TapObject { obj, kind, tag } => HostOutput::event(HostEvent::Tap {
                user: self.auth.effective_user().clone(),
                obj,
                kind,
                tag,
            }),
            HostCommand::TellObject { obj, text } => HostOutput::event(HostEvent::Tell {
                user: self.auth.effective_user().clone(),
                obj,
                text,
            }),
            HostCommand::Intent { intent, view_dir } => {
                HostOutput::event(HostEvent::Intent { intent, view_dir })
            }
            HostCommand::Raycast { origin, dir } => {
                if !self.awaiting_raycast {
                    log::debug!("raycast without a pending request, dropping");
                    return HostOutput::nothing();
                }
                if dir == Vec3::ZERO {
                    log::debug!("zero-direction raycast, dropping");
                    return HostOutput::nothing();
                }
                self.awaiting_raycast = false;
                HostOutput::event(HostEvent::Raycast { origin, dir })
            }
            HostCommand::RaycastCancel => {
                self.awaiting_raycast = false;
                HostOutput::event(HostEvent::RaycastCancelled)
            }
        }
    }

    fn resume(
        &mut self,
        token: SessionToken,
        registry: &SessionRegistry,
        now: Duration,
    ) -> HostEvent {
        let outcome = registry
            .resume(&token, &self.origin, now)
            .map(|entry| entry.user.clone());
        HostEvent::ResumeRequested { token, outcome }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
