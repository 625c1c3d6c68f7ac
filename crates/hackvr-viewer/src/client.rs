//! The viewer session: applies server commands, runs the per-connection
//! context, and assembles gated outbound commands.
//!
//! One `ViewerClient` owns everything a connection holds client-side: the
//! scene, the interaction gates, the effective userid, the announced session
//! token, and any pending authentication challenge. Frames go in through
//! [`ViewerClient::handle_event`]; everything the embedding UI must react to
//! comes back as a [`ViewerEvent`]. Outbound helpers return encoded lines
//! only when their gates allow the command at all.

use std::time::Duration;

use ed25519_dalek::SigningKey;
use glam::Vec3;

use hackvr_protocol::{
    EncodeError, Frame, FrameEvent, HostCommand, ObjectId, SessionToken, Tag, TapKind, UserId,
    ViewerCommand,
};
use hackvr_scene::{SceneLimits, SceneState};
use hackvr_session::{sign_challenge, AnnouncedToken, Origin};

use crate::assets::{AssetCache, AssetKey, AssetKind};
use crate::modes::InteractionModes;

/// Something the embedding UI must surface or act on.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    Chat {
        user: UserId,
        message: String,
    },
    /// Show the login affordance.
    PromptUser {
        prompt: Option<String>,
    },
    /// The server challenged; answer via [`ViewerClient::answer_challenge`].
    AuthChallenge {
        user: UserId,
    },
    UserAccepted(UserId),
    /// The reason is surfaced verbatim.
    UserRejected {
        user: UserId,
        reason: Option<String>,
    },
    SessionAnnounced(SessionToken),
    SessionRevoked(SessionToken),
    InputRequested {
        prompt: String,
    },
    InputCancelled,
    RaycastRequested,
    RaycastCancelled,
    /// Start an out-of-band fetch for a newly referenced asset.
    FetchAsset {
        key: AssetKey,
        kind: AssetKind,
    },
    /// The transport went away. The last rendered scene stays up and the
    /// viewer never reconnects on its own.
    Disconnected,
}

/// Where a confirmed `href` navigation goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationKind {
    /// A HackVR scheme: open a new world.
    World,
    /// Anything else: delegate to the host OS.
    External,
}

/// Classify a confirmed navigation target by scheme.
pub fn navigation_kind(target: &str) -> NavigationKind {
    let scheme = target.split(':').next().unwrap_or("");
    match scheme {
        "hackvr" | "hackvrs" | "http+hackvr" | "https+hackvr" => NavigationKind::World,
        _ => NavigationKind::External,
    }
}

/// The single outcome of one user pick action. Tap, tell-focus, and href
/// navigation are mutually exclusive.
#[derive(Debug, Clone, PartialEq)]
pub enum PickAction {
    /// Send this `tap-object` line.
    Tap(Vec<u8>),
    /// Ask the user to confirm navigation, showing the full target.
    ConfirmNavigate(String),
    /// Focus the object's text entry; a later [`ViewerClient::tell`] sends.
    FocusTextInput,
}

/// Client-side state of one established connection.
pub struct ViewerClient {
    pub scene: SceneState,
    pub modes: InteractionModes,
    pub assets: AssetCache,
    version: u32,
    origin: Origin,
    user: UserId,
    announced: AnnouncedToken,
    pending_challenge: Option<(UserId, [u8; 16])>,
}

impl ViewerClient {
    pub fn new(version: u32, origin: Origin, limits: SceneLimits) -> Self {
        Self {
            scene: SceneState::new(limits),
            modes: InteractionModes::new(),
            assets: AssetCache::new(),
            version,
            origin,
            user: UserId::anonymous(),
            announced: AnnouncedToken::default(),
            pending_challenge: None,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn effective_user(&self) -> &UserId {
        &self.user
    }

    pub fn announced_token(&self) -> Option<&SessionToken> {
        self.announced.current()
    }

    /// The transport closed. All outstanding modes and transitions are
    /// cancelled without further command events; the scene itself is kept so
    /// the last rendered world stays visible.
    pub fn on_transport_closed(&mut self, now: Duration) -> ViewerEvent {
        self.modes.on_cancel_input();
        self.modes.on_raycast_cancel();
        self.pending_challenge = None;
        // Snap every in-flight transition to its target.
        let ids: Vec<ObjectId> = self.scene.graph.ids().cloned().collect();
        for id in ids {
            if let Some(object) = self.scene.graph.get_mut(&id) {
                object.transitions = Default::default();
            }
        }
        self.scene.tick(now);
        ViewerEvent::Disconnected
    }

    /// Feed one framer event. Violations and malformed commands are dropped
    /// per the optimistic regime; the connection lives on.
    pub fn handle_event(&mut self, event: FrameEvent, now: Duration) -> Option<ViewerEvent> {
        match event {
            FrameEvent::Frame(frame) => self.handle_frame(&frame, now),
            FrameEvent::Violation(violation) => {
                log::debug!("dropping line after framing violation: {violation:?}");
                None
            }
        }
    }

    fn handle_frame(&mut self, frame: &Frame, now: Duration) -> Option<ViewerEvent> {
        let cmd = match ViewerCommand::parse(frame) {
            Ok(cmd) => cmd,
            Err(err) => {
                log::debug!("dropping command: {err}");
                return None;
            }
        };
        match cmd {
            ViewerCommand::Hello { .. } => {
                log::debug!("hackvr-hello after establishment, dropping");
                None
            }
            ViewerCommand::Chat { user, message } => Some(ViewerEvent::Chat { user, message }),
            ViewerCommand::RequestUser { prompt } => {
                self.pending_challenge = None;
                Some(ViewerEvent::PromptUser { prompt })
            }
            ViewerCommand::RequestAuthentication { user, nonce } => {
                self.pending_challenge = Some((user.clone(), nonce));
                Some(ViewerEvent::AuthChallenge { user })
            }
            ViewerCommand::AcceptUser { user } => {
                self.pending_challenge = None;
                self.user = user.clone();
                Some(ViewerEvent::UserAccepted(user))
            }
            ViewerCommand::RejectUser { user, reason } => {
                self.pending_challenge = None;
                self.user = UserId::anonymous();
                Some(ViewerEvent::UserRejected { user, reason })
            }
            ViewerCommand::AnnounceSession { token, .. } => {
                if let Some(previous) = self.announced.announce(token) {
                    log::debug!("token {previous:?} superseded on this connection");
                }
                Some(ViewerEvent::SessionAnnounced(token))
            }
            ViewerCommand::RevokeSession { token } => {
                self.announced.revoke(&token);
                Some(ViewerEvent::SessionRevoked(token))
            }
            ViewerCommand::RequestInput { prompt, default } => {
                self.modes.on_request_input(prompt.clone(), default);
                Some(ViewerEvent::InputRequested { prompt })
            }
            ViewerCommand::CancelInput => {
                self.modes.on_cancel_input();
                Some(ViewerEvent::InputCancelled)
            }
            ViewerCommand::RaycastRequest => {
                self.modes.on_raycast_request();
                Some(ViewerEvent::RaycastRequested)
            }
            ViewerCommand::RaycastCancel => {
                self.modes.on_raycast_cancel();
                Some(ViewerEvent::RaycastCancelled)
            }
            scene_cmd => {
                let fetch = asset_of(&scene_cmd);
                if let Err(err) = self.scene.apply(&scene_cmd, now) {
                    log::debug!("dropping scene command: {err}");
                    return None;
                }
                if let Some((key, kind)) = fetch {
                    if self.assets.request(key.clone()) {
                        return Some(ViewerEvent::FetchAsset { key, kind });
                    }
                }
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Outbound commands
    // -----------------------------------------------------------------------

    pub fn chat(&self, message: &str) -> Result<Vec<u8>, EncodeError> {
        HostCommand::Chat {
            message: message.to_string(),
        }
        .encode()
    }

    pub fn set_user(&self, user: UserId) -> Result<Vec<u8>, EncodeError> {
        HostCommand::SetUser { user }.encode()
    }

    /// Sign the pending challenge. The challenge is consumed; a second call
    /// without a new `request-authentication` yields nothing.
    pub fn answer_challenge(&mut self, key: &SigningKey) -> Option<Vec<u8>> {
        let (user, nonce) = self.pending_challenge.take()?;
        let signature = sign_challenge(key, &user, &nonce);
        HostCommand::Authenticate { user, signature }.encode().ok()
    }

    /// Ask the server to restore a session. The token must be bound to this
    /// connection's origin; anything else is refused locally.
    pub fn resume_session(
        &self,
        token: SessionToken,
        bound_origin: &Origin,
    ) -> Option<Vec<u8>> {
        if *bound_origin != self.origin {
            log::warn!("refusing to attach session token bound to a different origin");
            return None;
        }
        HostCommand::ResumeSession { token }.encode().ok()
    }

    /// Submit the text-input draft. Valid only while the mode is open.
    pub fn send_input(&mut self) -> Option<Vec<u8>> {
        let text = self.modes.take_send_input()?;
        HostCommand::SendInput { text }.encode().ok()
    }

    /// Emit a raycast and exit the mode. The direction need not be unit
    /// length, but a zero vector is invalid and leaves the mode open.
    pub fn raycast(&mut self, origin: Vec3, dir: Vec3) -> Option<Vec<u8>> {
        if !self.modes.raycast_active() {
            return None;
        }
        if dir == Vec3::ZERO {
            log::debug!("refusing zero-direction raycast");
            return None;
        }
        if !self.modes.take_raycast() {
            return None;
        }
        HostCommand::Raycast { origin, dir }.encode().ok()
    }

    /// Leave raycast mode from the viewer side.
    pub fn raycast_cancel(&mut self) -> Option<Vec<u8>> {
        if !self.modes.raycast_active() {
            return None;
        }
        self.modes.on_raycast_cancel();
        HostCommand::RaycastCancel.encode().ok()
    }

    /// Surface an intent the server registered. Unknown intents are not
    /// emitted.
    pub fn intent(&self, intent: &hackvr_protocol::IntentId, view_dir: Vec3) -> Option<Vec<u8>> {
        if !self.scene.intents.contains(intent) {
            return None;
        }
        HostCommand::Intent {
            intent: intent.clone(),
            view_dir,
        }
        .encode()
        .ok()
    }

    /// Resolve one user pick on an object into its single action: a tap
    /// (clickable with a referenceable tag), an href confirmation, or
    /// focusing text input. At most one fires per pick.
    pub fn pick(
        &self,
        obj: &ObjectId,
        kind: TapKind,
        picked_tag: Option<Tag>,
    ) -> Option<PickAction> {
        let object = self.scene.graph.get(obj)?;
        if object.props.clickable {
            if let Some(tag) = picked_tag {
                let line = HostCommand::TapObject {
                    obj: obj.clone(),
                    kind,
                    tag,
                }
                .encode()
                .ok()?;
                return Some(PickAction::Tap(line));
            }
        }
        if let Some(href) = &object.props.href {
            return Some(PickAction::ConfirmNavigate(href.clone()));
        }
        if object.props.textinput {
            return Some(PickAction::FocusTextInput);
        }
        None
    }

    /// Send text at an object; valid only when the object accepts it.
    pub fn tell(&self, obj: &ObjectId, text: &str) -> Option<Vec<u8>> {
        let object = self.scene.graph.get(obj)?;
        if !object.props.textinput {
            return None;
        }
        HostCommand::TellObject {
            obj: obj.clone(),
            text: text.to_string(),
        }
        .encode()
        .ok()
    }
}

/// The asset a geometry-creating command references, if any.
fn asset_of(cmd: &ViewerCommand) -> Option<(AssetKey, AssetKind)> {
    match cmd {
        ViewerCommand::CreateSpriteGeometry { uri, sha256, .. } => Some((
            AssetKey {
                uri: uri.clone(),
                sha256: *sha256,
            },
            AssetKind::Image,
        )),
        ViewerCommand::CreateTextGeometry {
            font_uri, sha256, ..
        } => Some((
            AssetKey {
                uri: font_uri.clone(),
                sha256: *sha256,
            },
            AssetKind::Font,
        )),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use hackvr_protocol::Ident;
    use hackvr_session::signing_payload;
    use rand::RngCore;

    fn origin() -> Origin {
        Origin::from_raw_url(&url::Url::parse("hackvr://example/world").unwrap()).unwrap()
    }

    fn client() -> ViewerClient {
        ViewerClient::new(1, origin(), SceneLimits::default())
    }

    fn feed(client: &mut ViewerClient, line: &str) -> Option<ViewerEvent> {
        let mut parts = line.split('\t');
        let frame = Frame {
            name: parts.next().unwrap().to_string(),
            args: parts.map(str::to_string).collect(),
        };
        client.handle_event(FrameEvent::Frame(frame), Duration::ZERO)
    }

    fn id(raw: &str) -> Ident {
        Ident::new(raw).unwrap()
    }

    #[test]
    fn minimal_scene_pick_emits_tap() {
        let mut client = client();
        feed(&mut client, "create-object\troom");
        feed(
            &mut client,
            "add-triangle-list\t$global\tfloor\t#808080\t(0 0 0)\t(1 0 0)\t(1 0 1)",
        );
        feed(&mut client, "set-object-property\troom\tclickable\ttrue");

        // The pick on $global resolves against $global's own properties; the
        // scenario taps the clickable room object.
        let action = client.pick(&id("room"), TapKind::Primary, Some(id("floor")));
        match action {
            Some(PickAction::Tap(line)) => {
                assert_eq!(line, b"tap-object\troom\tprimary\tfloor\r\n");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn tap_requires_clickable_and_tag() {
        let mut client = client();
        feed(&mut client, "create-object\tprop");
        assert_eq!(client.pick(&id("prop"), TapKind::Primary, Some(id("t"))), None);

        feed(&mut client, "set-object-property\tprop\tclickable\ttrue");
        assert_eq!(
            client.pick(&id("prop"), TapKind::Primary, None),
            None,
            "untagged triangles are unreferenceable"
        );
    }

    #[test]
    fn pick_actions_are_mutually_exclusive() {
        let mut client = client();
        feed(&mut client, "create-object\tsign");
        feed(
            &mut client,
            "set-object-property\tsign\thref\thackvr://other/world",
        );
        feed(&mut client, "set-object-property\tsign\ttextinput\ttrue");

        // Href wins over text focus when the object is not clickable-tagged.
        assert_eq!(
            client.pick(&id("sign"), TapKind::Primary, None),
            Some(PickAction::ConfirmNavigate("hackvr://other/world".into()))
        );

        feed(&mut client, "set-object-property\tsign\tclickable\ttrue");
        assert!(matches!(
            client.pick(&id("sign"), TapKind::Primary, Some(id("face"))),
            Some(PickAction::Tap(_))
        ));
    }

    #[test]
    fn tell_requires_textinput() {
        let mut client = client();
        feed(&mut client, "create-object\tterminal");
        assert!(client.tell(&id("terminal"), "hello").is_none());
        feed(&mut client, "set-object-property\tterminal\ttextinput\ttrue");
        let line = client.tell(&id("terminal"), "hello").unwrap();
        assert_eq!(line, b"tell-object\tterminal\thello\r\n");
    }

    #[test]
    fn text_input_round_trip() {
        let mut client = client();
        assert!(client.send_input().is_none());
        let event = feed(&mut client, "request-input\tYour name?\tanon");
        assert_eq!(
            event,
            Some(ViewerEvent::InputRequested {
                prompt: "Your name?".into()
            })
        );
        client.modes.set_draft("alice".into());
        let line = client.send_input().unwrap();
        assert_eq!(line, b"send-input\talice\r\n");
        assert!(client.send_input().is_none(), "gate closes after submit");
    }

    #[test]
    fn raycast_gating_and_zero_vector() {
        let mut client = client();
        assert!(client.raycast(Vec3::ZERO, -Vec3::Z).is_none());

        feed(&mut client, "raycast-request");
        assert!(
            client.raycast(Vec3::ZERO, Vec3::ZERO).is_none(),
            "zero direction is invalid"
        );
        assert!(client.modes.raycast_active(), "invalid ray keeps the mode");

        let line = client.raycast(Vec3::ZERO, -Vec3::Z).unwrap();
        assert_eq!(line, b"raycast\t(0 0 0)\t(0 0 -1)\r\n");
        assert!(
            client.raycast(Vec3::ZERO, -Vec3::Z).is_none(),
            "a raycast without a fresh request is dropped"
        );
    }

    #[test]
    fn auth_challenge_flow() {
        let mut client = client();
        let mut secret = [0u8; 32];
        rand::rng().fill_bytes(&mut secret);
        let key = SigningKey::from_bytes(&secret);

        feed(&mut client, "request-user\tlogin required");
        let nonce_hex = "ab".repeat(16);
        let event = feed(
            &mut client,
            &format!("request-authentication\talice\t{nonce_hex}"),
        );
        assert_eq!(
            event,
            Some(ViewerEvent::AuthChallenge {
                user: UserId::new("alice").unwrap()
            })
        );

        let line = client.answer_challenge(&key).unwrap();
        let text = String::from_utf8(line).unwrap();
        let signature_hex = text.trim_end().rsplit('\t').next().unwrap().to_string();
        let signature_bytes: [u8; 64] =
            hackvr_protocol::types::parse_bytes::<64>(&signature_hex).unwrap();

        // The signature verifies over the canonical payload.
        use ed25519_dalek::Verifier;
        let payload = signing_payload(&UserId::new("alice").unwrap(), &[0xab; 16]);
        key.verifying_key()
            .verify(&payload, &ed25519_dalek::Signature::from_bytes(&signature_bytes))
            .unwrap();

        assert!(client.answer_challenge(&key).is_none(), "challenge consumed");
    }

    #[test]
    fn accept_and_reject_update_effective_user() {
        let mut client = client();
        assert!(client.effective_user().is_anonymous());
        feed(&mut client, "accept-user\talice");
        assert_eq!(client.effective_user().as_str(), "alice");
        let event = feed(&mut client, "reject-user\talice\trejected");
        assert_eq!(
            event,
            Some(ViewerEvent::UserRejected {
                user: UserId::new("alice").unwrap(),
                reason: Some("rejected".into())
            })
        );
        assert!(client.effective_user().is_anonymous());
    }

    #[test]
    fn session_announce_and_revoke() {
        let mut client = client();
        let token = SessionToken([9u8; 32]);
        feed(&mut client, &format!("announce-session\t{token}"));
        assert_eq!(client.announced_token(), Some(&token));
        feed(&mut client, &format!("revoke-session\t{token}"));
        assert!(client.announced_token().is_none());
    }

    #[test]
    fn resume_refuses_foreign_origin() {
        let client = client();
        let token = SessionToken([1u8; 32]);
        assert!(client.resume_session(token, &origin()).is_some());
        let foreign =
            Origin::from_raw_url(&url::Url::parse("hackvr://elsewhere/world").unwrap()).unwrap();
        assert!(client.resume_session(token, &foreign).is_none());
    }

    #[test]
    fn intent_gate() {
        let mut client = client();
        assert!(client.intent(&id("$forward"), -Vec3::Z).is_some());
        assert!(client.intent(&id("unknown"), -Vec3::Z).is_none());
        feed(&mut client, "create-intent\topen-door\tOpen");
        assert!(client.intent(&id("open-door"), -Vec3::Z).is_some());
    }

    #[test]
    fn sprite_create_requests_asset_once() {
        let mut client = client();
        let sha = "00".repeat(32);
        let event = feed(
            &mut client,
            &format!(
                "create-sprite-geometry\tposter\t(2 1)\thttps://example.com/a.png\t{sha}"
            ),
        );
        assert!(matches!(
            event,
            Some(ViewerEvent::FetchAsset {
                kind: AssetKind::Image,
                ..
            })
        ));
        // Same asset on another geometry id: deduplicated.
        let event = feed(
            &mut client,
            &format!(
                "create-sprite-geometry\tposter2\t(2 1)\thttps://example.com/a.png\t{sha}"
            ),
        );
        assert!(event.is_none());
    }

    #[test]
    fn navigation_kind_by_scheme() {
        assert_eq!(navigation_kind("hackvr://other/world"), NavigationKind::World);
        assert_eq!(
            navigation_kind("https+hackvr://other/world"),
            NavigationKind::World
        );
        assert_eq!(
            navigation_kind("https://example.com/page"),
            NavigationKind::External
        );
        assert_eq!(navigation_kind("mailto:a@b.c"), NavigationKind::External);
    }

    #[test]
    fn transport_close_cancels_modes_keeps_scene() {
        let mut client = client();
        feed(&mut client, "create-object\tkeep-me");
        feed(&mut client, "request-input\tq");
        feed(&mut client, "raycast-request");

        assert_eq!(
            client.on_transport_closed(Duration::ZERO),
            ViewerEvent::Disconnected
        );
        assert!(!client.modes.text_input_active());
        assert!(!client.modes.raycast_active());
        assert!(client.scene.graph.contains(&id("keep-me")), "scene retained");
    }

    #[test]
    fn malformed_commands_are_dropped_silently() {
        let mut client = client();
        assert!(feed(&mut client, "no-such-command\tx").is_none());
        assert!(feed(&mut client, "tap-object\ta\tprimary\tt").is_none(), "wrong direction");
        assert!(feed(&mut client, "set-background-color\tnot-a-color").is_none());
        // Connection state is untouched and further commands still work.
        assert!(feed(&mut client, "create-object\tstill-works").is_none());
        assert!(client.scene.graph.contains(&id("still-works")));
    }
}
