//! Command catalog and typed dispatch.
//!
//! Every protocol command is listed here with its direction and argument
//! schema. Parsing maps a raw [`Frame`] onto one of two direction-typed
//! enums: [`ViewerCommand`] for lines a viewer receives (S→C) and
//! [`HostCommand`] for lines a host receives (C→S). A command name that
//! exists only in the opposite catalog is a direction violation, which the
//! caller treats as fatal during establishment and as a dropped line after.
//!
//! Optional parameters follow the wire mapping: omitted means absent, and
//! present-but-empty also means absent for every type except `zstring`.

use glam::{Vec2, Vec3};

use crate::encode::encode_line;
use crate::error::{CommandError, EncodeError};
use crate::framer::Frame;
use crate::selector::Selector;
use crate::types::{
    self, Anchor, Color, Euler, GeomId, Ident, IntentId, ObjectId, ReparentMode, SessionToken,
    SizeMode, Tag, TapKind, TrackMode, TypeError, UserId,
};

/// Which endpoint may send a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ServerToClient,
    ClientToServer,
    Either,
}

/// Command name constants.
pub mod name {
    pub const HELLO: &str = "hackvr-hello";
    pub const CHAT: &str = "chat";
    pub const SET_USER: &str = "set-user";
    pub const AUTHENTICATE: &str = "authenticate";
    pub const RESUME_SESSION: &str = "resume-session";
    pub const SEND_INPUT: &str = "send-input";
    pub const TAP_OBJECT: &str = "tap-object";
    pub const TELL_OBJECT: &str = "tell-object";
    pub const INTENT: &str = "intent";
    pub const RAYCAST: &str = "raycast";
    pub const RAYCAST_CANCEL: &str = "raycast-cancel";
    pub const REQUEST_USER: &str = "request-user";
    pub const REQUEST_AUTHENTICATION: &str = "request-authentication";
    pub const ACCEPT_USER: &str = "accept-user";
    pub const REJECT_USER: &str = "reject-user";
    pub const ANNOUNCE_SESSION: &str = "announce-session";
    pub const REVOKE_SESSION: &str = "revoke-session";
    pub const REQUEST_INPUT: &str = "request-input";
    pub const CANCEL_INPUT: &str = "cancel-input";
    pub const SET_BANNER: &str = "set-banner";
    pub const CREATE_INTENT: &str = "create-intent";
    pub const DESTROY_INTENT: &str = "destroy-intent";
    pub const RAYCAST_REQUEST: &str = "raycast-request";
    pub const CREATE_GEOMETRY: &str = "create-geometry";
    pub const DESTROY_GEOMETRY: &str = "destroy-geometry";
    pub const ADD_TRIANGLE_LIST: &str = "add-triangle-list";
    pub const ADD_TRIANGLE_STRIP: &str = "add-triangle-strip";
    pub const ADD_TRIANGLE_FAN: &str = "add-triangle-fan";
    pub const REMOVE_TRIANGLES: &str = "remove-triangles";
    pub const CREATE_SPRITE_GEOMETRY: &str = "create-sprite-geometry";
    pub const CREATE_TEXT_GEOMETRY: &str = "create-text-geometry";
    pub const SET_TEXT_PROPERTY: &str = "set-text-property";
    pub const CREATE_OBJECT: &str = "create-object";
    pub const DESTROY_OBJECT: &str = "destroy-object";
    pub const REPARENT_OBJECT: &str = "reparent-object";
    pub const SET_OBJECT_GEOMETRY: &str = "set-object-geometry";
    pub const SET_OBJECT_PROPERTY: &str = "set-object-property";
    pub const SET_OBJECT_TRANSFORM: &str = "set-object-transform";
    pub const TRACK_OBJECT: &str = "track-object";
    pub const ENABLE_FREE_LOOK: &str = "enable-free-look";
    pub const SET_BACKGROUND_COLOR: &str = "set-background-color";
}

/// Direction of a known command name, or `None` if the name is unknown.
pub fn direction_of(command: &str) -> Option<Direction> {
    use Direction::*;
    Some(match command {
        name::HELLO | name::CHAT | name::RAYCAST_CANCEL => Either,
        name::SET_USER
        | name::AUTHENTICATE
        | name::RESUME_SESSION
        | name::SEND_INPUT
        | name::TAP_OBJECT
        | name::TELL_OBJECT
        | name::INTENT
        | name::RAYCAST => ClientToServer,
        name::REQUEST_USER
        | name::REQUEST_AUTHENTICATION
        | name::ACCEPT_USER
        | name::REJECT_USER
        | name::ANNOUNCE_SESSION
        | name::REVOKE_SESSION
        | name::REQUEST_INPUT
        | name::CANCEL_INPUT
        | name::SET_BANNER
        | name::CREATE_INTENT
        | name::DESTROY_INTENT
        | name::RAYCAST_REQUEST
        | name::CREATE_GEOMETRY
        | name::DESTROY_GEOMETRY
        | name::ADD_TRIANGLE_LIST
        | name::ADD_TRIANGLE_STRIP
        | name::ADD_TRIANGLE_FAN
        | name::REMOVE_TRIANGLES
        | name::CREATE_SPRITE_GEOMETRY
        | name::CREATE_TEXT_GEOMETRY
        | name::SET_TEXT_PROPERTY
        | name::CREATE_OBJECT
        | name::DESTROY_OBJECT
        | name::REPARENT_OBJECT
        | name::SET_OBJECT_GEOMETRY
        | name::SET_OBJECT_PROPERTY
        | name::SET_OBJECT_TRANSFORM
        | name::TRACK_OBJECT
        | name::ENABLE_FREE_LOOK
        | name::SET_BACKGROUND_COLOR => ServerToClient,
        _ => return None,
    })
}

/// One wire triangle from `add-triangle-list`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleRecord {
    pub color: Color,
    pub v0: Vec3,
    pub v1: Vec3,
    pub v2: Vec3,
}

// ---------------------------------------------------------------------------
// Viewer-bound commands (S→C)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerCommand {
    Hello {
        max_version: u32,
    },
    Chat {
        user: UserId,
        message: String,
    },
    RequestUser {
        prompt: Option<String>,
    },
    RequestAuthentication {
        user: UserId,
        nonce: [u8; 16],
    },
    AcceptUser {
        user: UserId,
    },
    RejectUser {
        user: UserId,
        reason: Option<String>,
    },
    AnnounceSession {
        token: SessionToken,
        lifetime: Option<u64>,
    },
    RevokeSession {
        token: SessionToken,
    },
    RequestInput {
        prompt: String,
        default: Option<String>,
    },
    CancelInput,
    SetBanner {
        text: Option<String>,
        duration: Option<f32>,
    },
    CreateIntent {
        intent: Selector,
        label: String,
    },
    DestroyIntent {
        intent: Selector,
    },
    RaycastRequest,
    RaycastCancel,
    CreateGeometry {
        geom: Selector,
    },
    DestroyGeometry {
        geom: Selector,
    },
    AddTriangleList {
        geom: Selector,
        tag: Option<Tag>,
        triangles: Vec<TriangleRecord>,
    },
    AddTriangleStrip {
        geom: Selector,
        tag: Option<Tag>,
        color: Color,
        seed: [Vec3; 3],
        rest: Vec<Vec3>,
    },
    AddTriangleFan {
        geom: Selector,
        tag: Option<Tag>,
        color: Color,
        seed: [Vec3; 3],
        rest: Vec<Vec3>,
    },
    RemoveTriangles {
        geom: Selector,
        tag: Selector,
    },
    CreateSpriteGeometry {
        geom: Selector,
        size: Vec2,
        uri: String,
        sha256: [u8; 32],
        mode: Option<SizeMode>,
        anchor: Option<Anchor>,
    },
    CreateTextGeometry {
        geom: Selector,
        size: Vec2,
        font_uri: String,
        sha256: [u8; 32],
        text: String,
        anchor: Option<Anchor>,
    },
    SetTextProperty {
        geom: Selector,
        prop: String,
        value: String,
    },
    CreateObject {
        obj: Selector,
        geom: Option<GeomId>,
    },
    DestroyObject {
        obj: Selector,
    },
    ReparentObject {
        parent: ObjectId,
        child: Selector,
        mode: Option<ReparentMode>,
    },
    SetObjectGeometry {
        obj: Selector,
        geom: Option<GeomId>,
    },
    SetObjectProperty {
        obj: Selector,
        prop: String,
        value: String,
    },
    SetObjectTransform {
        obj: Selector,
        pos: Option<Vec3>,
        rot: Option<Euler>,
        scale: Option<Vec3>,
        duration: Option<f32>,
    },
    TrackObject {
        obj: Selector,
        target: Option<ObjectId>,
        mode: Option<TrackMode>,
        duration: Option<f32>,
    },
    EnableFreeLook {
        enabled: bool,
    },
    SetBackgroundColor {
        color: Color,
    },
}

impl ViewerCommand {
    /// Parse a frame received by the viewer. Names known only in the C→S
    /// direction are reported as direction violations.
    pub fn parse(frame: &Frame) -> Result<Self, CommandError> {
        let mut args = Args::new(frame);
        let cmd = match frame.name.as_str() {
            name::HELLO => ViewerCommand::Hello {
                max_version: args.required("max-version", types::parse_version)?,
            },
            name::CHAT => ViewerCommand::Chat {
                user: args.required("user", types::parse_userid)?,
                message: args.required("message", types::parse_string)?,
            },
            name::REQUEST_USER => ViewerCommand::RequestUser {
                prompt: args.optional("prompt", types::parse_string)?,
            },
            name::REQUEST_AUTHENTICATION => ViewerCommand::RequestAuthentication {
                user: args.required("user", types::parse_userid)?,
                nonce: args.required("nonce", types::parse_bytes::<16>)?,
            },
            name::ACCEPT_USER => ViewerCommand::AcceptUser {
                user: args.required("user", types::parse_userid)?,
            },
            name::REJECT_USER => ViewerCommand::RejectUser {
                user: args.required("user", types::parse_userid)?,
                reason: args.optional("reason", types::parse_string)?,
            },
            name::ANNOUNCE_SESSION => ViewerCommand::AnnounceSession {
                token: args.required("token", SessionToken::parse)?,
                lifetime: args.optional("lifetime", types::parse_int)?,
            },
            name::REVOKE_SESSION => ViewerCommand::RevokeSession {
                token: args.required("token", SessionToken::parse)?,
            },
            name::REQUEST_INPUT => ViewerCommand::RequestInput {
                prompt: args.required("prompt", types::parse_string)?,
                default: args.optional("default", types::parse_string)?,
            },
            name::CANCEL_INPUT => ViewerCommand::CancelInput,
            name::SET_BANNER => ViewerCommand::SetBanner {
                text: args.optional("text", types::parse_string)?,
                duration: args.optional("duration", types::parse_float)?,
            },
            name::CREATE_INTENT => ViewerCommand::CreateIntent {
                intent: args.create_selector("intent")?,
                label: args.required("label", types::parse_string)?,
            },
            name::DESTROY_INTENT => ViewerCommand::DestroyIntent {
                intent: args.selector("intent")?,
            },
            name::RAYCAST_REQUEST => ViewerCommand::RaycastRequest,
            name::RAYCAST_CANCEL => ViewerCommand::RaycastCancel,
            name::CREATE_GEOMETRY => ViewerCommand::CreateGeometry {
                geom: args.create_selector("geom")?,
            },
            name::DESTROY_GEOMETRY => ViewerCommand::DestroyGeometry {
                geom: args.selector("geom")?,
            },
            name::ADD_TRIANGLE_LIST => {
                let geom = args.selector("geom")?;
                let tag = args.optional("tag", |raw| Ident::new(raw))?;
                let triangles = parse_triangle_list(args.rest())?;
                ViewerCommand::AddTriangleList {
                    geom,
                    tag,
                    triangles,
                }
            }
            name::ADD_TRIANGLE_STRIP => {
                let (geom, tag, color, seed, rest) = parse_seeded_triangles(&mut args)?;
                ViewerCommand::AddTriangleStrip {
                    geom,
                    tag,
                    color,
                    seed,
                    rest,
                }
            }
            name::ADD_TRIANGLE_FAN => {
                let (geom, tag, color, seed, rest) = parse_seeded_triangles(&mut args)?;
                ViewerCommand::AddTriangleFan {
                    geom,
                    tag,
                    color,
                    seed,
                    rest,
                }
            }
            name::REMOVE_TRIANGLES => ViewerCommand::RemoveTriangles {
                geom: args.selector("geom")?,
                tag: args.selector("tag")?,
            },
            name::CREATE_SPRITE_GEOMETRY => ViewerCommand::CreateSpriteGeometry {
                geom: args.create_selector("geom")?,
                size: args.required("size", types::parse_vec2)?,
                uri: args.required("uri", types::parse_uri)?,
                sha256: args.required("sha256", types::parse_bytes::<32>)?,
                mode: args.optional("mode", SizeMode::parse)?,
                anchor: args.optional("anchor", Anchor::parse)?,
            },
            name::CREATE_TEXT_GEOMETRY => ViewerCommand::CreateTextGeometry {
                geom: args.create_selector("geom")?,
                size: args.required("size", types::parse_vec2)?,
                font_uri: args.required("font-uri", types::parse_uri)?,
                sha256: args.required("sha256", types::parse_bytes::<32>)?,
                text: args.required("text", types::parse_string)?,
                anchor: args.optional("anchor", Anchor::parse)?,
            },
            name::SET_TEXT_PROPERTY => ViewerCommand::SetTextProperty {
                geom: args.selector("geom")?,
                prop: args.required("prop", types::parse_string)?,
                value: args.zstring(),
            },
            name::CREATE_OBJECT => ViewerCommand::CreateObject {
                obj: args.create_selector("obj")?,
                geom: args.optional("geom", |raw| Ident::new(raw))?,
            },
            name::DESTROY_OBJECT => ViewerCommand::DestroyObject {
                obj: args.selector("obj")?,
            },
            name::REPARENT_OBJECT => ViewerCommand::ReparentObject {
                parent: args.required("parent", |raw| Ident::new(raw))?,
                child: args.selector("child")?,
                mode: args.optional("mode", ReparentMode::parse)?,
            },
            name::SET_OBJECT_GEOMETRY => ViewerCommand::SetObjectGeometry {
                obj: args.selector("obj")?,
                geom: args.optional("geom", |raw| Ident::new(raw))?,
            },
            name::SET_OBJECT_PROPERTY => ViewerCommand::SetObjectProperty {
                obj: args.selector("obj")?,
                prop: args.required("prop", types::parse_string)?,
                value: args.zstring(),
            },
            name::SET_OBJECT_TRANSFORM => ViewerCommand::SetObjectTransform {
                obj: args.selector("obj")?,
                pos: args.optional("pos", types::parse_vec3)?,
                rot: args.optional("rot", types::parse_euler)?,
                scale: args.optional("scale", types::parse_vec3)?,
                duration: args.optional("duration", types::parse_float)?,
            },
            name::TRACK_OBJECT => ViewerCommand::TrackObject {
                obj: args.selector("obj")?,
                target: args.optional("target", |raw| Ident::new(raw))?,
                mode: args.optional("mode", TrackMode::parse)?,
                duration: args.optional("duration", types::parse_float)?,
            },
            name::ENABLE_FREE_LOOK => ViewerCommand::EnableFreeLook {
                enabled: args.required("enabled", types::parse_bool)?,
            },
            name::SET_BACKGROUND_COLOR => ViewerCommand::SetBackgroundColor {
                color: args.required("color", Color::parse)?,
            },
            other => {
                return Err(match direction_of(other) {
                    Some(_) => CommandError::WrongDirection(other.to_string()),
                    None => CommandError::UnknownCommand(other.to_string()),
                })
            }
        };
        Ok(cmd)
    }

    /// Encode for sending from the server side.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        match self {
            ViewerCommand::Hello { max_version } => {
                finish(name::HELLO, vec![types::format_version(*max_version)])
            }
            ViewerCommand::Chat { user, message } => {
                finish(name::CHAT, vec![user.to_string(), message.clone()])
            }
            ViewerCommand::RequestUser { prompt } => {
                finish(name::REQUEST_USER, vec![opt_str(prompt)])
            }
            ViewerCommand::RequestAuthentication { user, nonce } => finish(
                name::REQUEST_AUTHENTICATION,
                vec![user.to_string(), types::format_bytes(nonce)],
            ),
            ViewerCommand::AcceptUser { user } => {
                finish(name::ACCEPT_USER, vec![user.to_string()])
            }
            ViewerCommand::RejectUser { user, reason } => {
                finish(name::REJECT_USER, vec![user.to_string(), opt_str(reason)])
            }
            ViewerCommand::AnnounceSession { token, lifetime } => finish(
                name::ANNOUNCE_SESSION,
                vec![
                    token.to_string(),
                    lifetime.map(|v| v.to_string()).unwrap_or_default(),
                ],
            ),
            ViewerCommand::RevokeSession { token } => {
                finish(name::REVOKE_SESSION, vec![token.to_string()])
            }
            ViewerCommand::RequestInput { prompt, default } => {
                finish(name::REQUEST_INPUT, vec![prompt.clone(), opt_str(default)])
            }
            ViewerCommand::CancelInput => finish(name::CANCEL_INPUT, vec![]),
            ViewerCommand::SetBanner { text, duration } => finish(
                name::SET_BANNER,
                vec![
                    opt_str(text),
                    duration.map(types::format_float).unwrap_or_default(),
                ],
            ),
            ViewerCommand::CreateIntent { intent, label } => finish(
                name::CREATE_INTENT,
                vec![intent.to_string(), label.clone()],
            ),
            ViewerCommand::DestroyIntent { intent } => {
                finish(name::DESTROY_INTENT, vec![intent.to_string()])
            }
            ViewerCommand::RaycastRequest => finish(name::RAYCAST_REQUEST, vec![]),
            ViewerCommand::RaycastCancel => finish(name::RAYCAST_CANCEL, vec![]),
            ViewerCommand::CreateGeometry { geom } => {
                finish(name::CREATE_GEOMETRY, vec![geom.to_string()])
            }
            ViewerCommand::DestroyGeometry { geom } => {
                finish(name::DESTROY_GEOMETRY, vec![geom.to_string()])
            }
            ViewerCommand::AddTriangleList {
                geom,
                tag,
                triangles,
            } => {
                let mut params = vec![geom.to_string(), opt_ident(tag)];
                for triangle in triangles {
                    params.push(triangle.color.to_string());
                    params.push(types::format_vec3(triangle.v0));
                    params.push(types::format_vec3(triangle.v1));
                    params.push(types::format_vec3(triangle.v2));
                }
                finish(name::ADD_TRIANGLE_LIST, params)
            }
            ViewerCommand::AddTriangleStrip {
                geom,
                tag,
                color,
                seed,
                rest,
            } => finish(
                name::ADD_TRIANGLE_STRIP,
                seeded_params(geom, tag, color, seed, rest),
            ),
            ViewerCommand::AddTriangleFan {
                geom,
                tag,
                color,
                seed,
                rest,
            } => finish(
                name::ADD_TRIANGLE_FAN,
                seeded_params(geom, tag, color, seed, rest),
            ),
            ViewerCommand::RemoveTriangles { geom, tag } => finish(
                name::REMOVE_TRIANGLES,
                vec![geom.to_string(), tag.to_string()],
            ),
            ViewerCommand::CreateSpriteGeometry {
                geom,
                size,
                uri,
                sha256,
                mode,
                anchor,
            } => finish(
                name::CREATE_SPRITE_GEOMETRY,
                vec![
                    geom.to_string(),
                    types::format_vec2(*size),
                    uri.clone(),
                    types::format_bytes(sha256),
                    mode.map(|m| m.as_str().to_string()).unwrap_or_default(),
                    anchor.map(|a| a.as_str().to_string()).unwrap_or_default(),
                ],
            ),
            ViewerCommand::CreateTextGeometry {
                geom,
                size,
                font_uri,
                sha256,
                text,
                anchor,
            } => finish(
                name::CREATE_TEXT_GEOMETRY,
                vec![
                    geom.to_string(),
                    types::format_vec2(*size),
                    font_uri.clone(),
                    types::format_bytes(sha256),
                    text.clone(),
                    anchor.map(|a| a.as_str().to_string()).unwrap_or_default(),
                ],
            ),
            ViewerCommand::SetTextProperty { geom, prop, value } => finish(
                name::SET_TEXT_PROPERTY,
                vec![geom.to_string(), prop.clone(), value.clone()],
            ),
            ViewerCommand::CreateObject { obj, geom } => finish(
                name::CREATE_OBJECT,
                vec![obj.to_string(), opt_ident(geom)],
            ),
            ViewerCommand::DestroyObject { obj } => {
                finish(name::DESTROY_OBJECT, vec![obj.to_string()])
            }
            ViewerCommand::ReparentObject {
                parent,
                child,
                mode,
            } => finish(
                name::REPARENT_OBJECT,
                vec![
                    parent.to_string(),
                    child.to_string(),
                    mode.map(|m| m.as_str().to_string()).unwrap_or_default(),
                ],
            ),
            ViewerCommand::SetObjectGeometry { obj, geom } => finish(
                name::SET_OBJECT_GEOMETRY,
                vec![obj.to_string(), opt_ident(geom)],
            ),
            ViewerCommand::SetObjectProperty { obj, prop, value } => finish(
                name::SET_OBJECT_PROPERTY,
                vec![obj.to_string(), prop.clone(), value.clone()],
            ),
            ViewerCommand::SetObjectTransform {
                obj,
                pos,
                rot,
                scale,
                duration,
            } => finish(
                name::SET_OBJECT_TRANSFORM,
                vec![
                    obj.to_string(),
                    pos.map(types::format_vec3).unwrap_or_default(),
                    rot.map(types::format_euler).unwrap_or_default(),
                    scale.map(types::format_vec3).unwrap_or_default(),
                    duration.map(types::format_float).unwrap_or_default(),
                ],
            ),
            ViewerCommand::TrackObject {
                obj,
                target,
                mode,
                duration,
            } => finish(
                name::TRACK_OBJECT,
                vec![
                    obj.to_string(),
                    opt_ident(target),
                    mode.map(|m| m.as_str().to_string()).unwrap_or_default(),
                    duration.map(types::format_float).unwrap_or_default(),
                ],
            ),
            ViewerCommand::EnableFreeLook { enabled } => finish(
                name::ENABLE_FREE_LOOK,
                vec![if *enabled { "true" } else { "false" }.to_string()],
            ),
            ViewerCommand::SetBackgroundColor { color } => {
                finish(name::SET_BACKGROUND_COLOR, vec![color.to_string()])
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Host-bound commands (C→S)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    Hello {
        max_version: u32,
        uri: String,
        token: Option<SessionToken>,
    },
    Chat {
        message: String,
    },
    SetUser {
        user: UserId,
    },
    Authenticate {
        user: UserId,
        signature: [u8; 64],
    },
    ResumeSession {
        token: SessionToken,
    },
    SendInput {
        text: String,
    },
    TapObject {
        obj: ObjectId,
        kind: TapKind,
        tag: Tag,
    },
    TellObject {
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
    RaycastCancel,
}

impl HostCommand {
    /// Parse a frame received by the host. Names known only in the S→C
    /// direction are reported as direction violations.
    pub fn parse(frame: &Frame) -> Result<Self, CommandError> {
        let mut args = Args::new(frame);
        let cmd = match frame.name.as_str() {
            name::HELLO => HostCommand::Hello {
                max_version: args.required("max-version", types::parse_version)?,
                uri: args.required("uri", types::parse_uri)?,
                token: args.optional("token", SessionToken::parse)?,
            },
            name::CHAT => HostCommand::Chat {
                message: args.required("message", types::parse_string)?,
            },
            name::SET_USER => HostCommand::SetUser {
                user: args.required("user", types::parse_userid)?,
            },
            name::AUTHENTICATE => HostCommand::Authenticate {
                user: args.required("user", types::parse_userid)?,
                signature: args.required("signature", types::parse_bytes::<64>)?,
            },
            name::RESUME_SESSION => HostCommand::ResumeSession {
                token: args.required("token", SessionToken::parse)?,
            },
            name::SEND_INPUT => HostCommand::SendInput {
                text: args.zstring(),
            },
            name::TAP_OBJECT => HostCommand::TapObject {
                obj: args.required("obj", |raw| Ident::new(raw))?,
                kind: args.required("kind", TapKind::parse)?,
                tag: args.required("tag", |raw| Ident::new(raw))?,
            },
            name::TELL_OBJECT => HostCommand::TellObject {
                obj: args.required("obj", |raw| Ident::new(raw))?,
                text: args.zstring(),
            },
            name::INTENT => HostCommand::Intent {
                intent: args.required("intent", |raw| Ident::new(raw))?,
                view_dir: args.required("view-dir", types::parse_vec3)?,
            },
            name::RAYCAST => HostCommand::Raycast {
                origin: args.required("origin", types::parse_vec3)?,
                dir: args.required("dir", types::parse_vec3)?,
            },
            name::RAYCAST_CANCEL => HostCommand::RaycastCancel,
            other => {
                return Err(match direction_of(other) {
                    Some(_) => CommandError::WrongDirection(other.to_string()),
                    None => CommandError::UnknownCommand(other.to_string()),
                })
            }
        };
        Ok(cmd)
    }

    /// Encode for sending from the viewer side.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        match self {
            HostCommand::Hello {
                max_version,
                uri,
                token,
            } => finish(
                name::HELLO,
                vec![
                    types::format_version(*max_version),
                    uri.clone(),
                    token.map(|t| t.to_string()).unwrap_or_default(),
                ],
            ),
            HostCommand::Chat { message } => finish(name::CHAT, vec![message.clone()]),
            HostCommand::SetUser { user } => finish(name::SET_USER, vec![user.to_string()]),
            HostCommand::Authenticate { user, signature } => finish(
                name::AUTHENTICATE,
                vec![user.to_string(), types::format_bytes(signature)],
            ),
            HostCommand::ResumeSession { token } => {
                finish(name::RESUME_SESSION, vec![token.to_string()])
            }
            HostCommand::SendInput { text } => finish(name::SEND_INPUT, vec![text.clone()]),
            HostCommand::TapObject { obj, kind, tag } => finish(
                name::TAP_OBJECT,
                vec![
                    obj.to_string(),
                    kind.as_str().to_string(),
                    tag.to_string(),
                ],
            ),
            HostCommand::TellObject { obj, text } => {
                finish(name::TELL_OBJECT, vec![obj.to_string(), text.clone()])
            }
            HostCommand::Intent { intent, view_dir } => finish(
                name::INTENT,
                vec![intent.to_string(), types::format_vec3(*view_dir)],
            ),
            HostCommand::Raycast { origin, dir } => finish(
                name::RAYCAST,
                vec![types::format_vec3(*origin), types::format_vec3(*dir)],
            ),
            HostCommand::RaycastCancel => finish(name::RAYCAST_CANCEL, vec![]),
        }
    }
}

// ---------------------------------------------------------------------------
// Argument cursor
// ---------------------------------------------------------------------------

/// Positional cursor over a frame's raw arguments implementing the
/// optional-parameter mapping: a missing slot reads as the empty string, and
/// the empty string means "absent" for every type except `zstring`.
struct Args<'a> {
    frame: &'a Frame,
    index: usize,
}

impl<'a> Args<'a> {
    fn new(frame: &'a Frame) -> Self {
        Self { frame, index: 0 }
    }

    fn raw(&mut self) -> &'a str {
        let value = self
            .frame
            .args
            .get(self.index)
            .map_or("", String::as_str);
        self.index += 1;
        value
    }

    fn required<T>(
        &mut self,
        param: &'static str,
        parse: impl Fn(&str) -> Result<T, TypeError>,
    ) -> Result<T, CommandError> {
        let raw = self.raw();
        if raw.is_empty() {
            return Err(CommandError::MissingArgument(param));
        }
        parse(raw).map_err(|err| CommandError::BadArgument(param, err))
    }

    fn optional<T>(
        &mut self,
        param: &'static str,
        parse: impl Fn(&str) -> Result<T, TypeError>,
    ) -> Result<Option<T>, CommandError> {
        let raw = self.raw();
        if raw.is_empty() {
            return Ok(None);
        }
        parse(raw)
            .map(Some)
            .map_err(|err| CommandError::BadArgument(param, err))
    }

    /// `zstring`: the only type where present-but-empty stays the empty
    /// string (and a missing slot reads as empty too).
    fn zstring(&mut self) -> String {
        self.raw().to_string()
    }

    fn selector(&mut self, param: &'static str) -> Result<Selector, CommandError> {
        let raw = self.raw();
        if raw.is_empty() {
            return Err(CommandError::MissingArgument(param));
        }
        Selector::parse(raw).map_err(|err| CommandError::BadSelector(param, err))
    }

    /// Selector in a create-family position: expansion groups only, bare
    /// `*`/`?` are command errors.
    fn create_selector(&mut self, param: &'static str) -> Result<Selector, CommandError> {
        let selector = self.selector(param)?;
        if selector.has_wildcards() {
            return Err(CommandError::BadSelector(
                param,
                crate::selector::SelectorError::WildcardForbidden,
            ));
        }
        Ok(selector)
    }

    /// The unconsumed tail, for variadic commands.
    fn rest(&self) -> &'a [String] {
        self.frame.args.get(self.index..).unwrap_or(&[])
    }
}

fn parse_triangle_list(tail: &[String]) -> Result<Vec<TriangleRecord>, CommandError> {
    if tail.len() % 4 != 0 {
        return Err(CommandError::BadTail("triangle list is groups of four"));
    }
    let mut triangles = Vec::with_capacity(tail.len() / 4);
    for chunk in tail.chunks_exact(4) {
        triangles.push(TriangleRecord {
            color: Color::parse(&chunk[0])
                .map_err(|err| CommandError::BadArgument("color", err))?,
            v0: types::parse_vec3(&chunk[1])
                .map_err(|err| CommandError::BadArgument("v0", err))?,
            v1: types::parse_vec3(&chunk[2])
                .map_err(|err| CommandError::BadArgument("v1", err))?,
            v2: types::parse_vec3(&chunk[3])
                .map_err(|err| CommandError::BadArgument("v2", err))?,
        });
    }
    Ok(triangles)
}

type SeededTriangles = (Selector, Option<Tag>, Color, [Vec3; 3], Vec<Vec3>);

fn parse_seeded_triangles(args: &mut Args<'_>) -> Result<SeededTriangles, CommandError> {
    let geom = args.selector("geom")?;
    let tag = args.optional("tag", |raw| Ident::new(raw))?;
    let color = args.required("color", Color::parse)?;
    let p0 = args.required("p0", types::parse_vec3)?;
    let p1 = args.required("p1", types::parse_vec3)?;
    let p2 = args.required("p2", types::parse_vec3)?;
    let mut rest = Vec::new();
    for raw in args.rest() {
        rest.push(
            types::parse_vec3(raw).map_err(|err| CommandError::BadArgument("pos", err))?,
        );
    }
    Ok((geom, tag, color, [p0, p1, p2], rest))
}

fn seeded_params(
    geom: &Selector,
    tag: &Option<Tag>,
    color: &Color,
    seed: &[Vec3; 3],
    rest: &[Vec3],
) -> Vec<String> {
    let mut params = vec![
        geom.to_string(),
        opt_ident(tag),
        color.to_string(),
        types::format_vec3(seed[0]),
        types::format_vec3(seed[1]),
        types::format_vec3(seed[2]),
    ];
    params.extend(rest.iter().map(|pos| types::format_vec3(*pos)));
    params
}

/// Drop trailing absent parameters, then encode.
fn finish(command: &str, mut params: Vec<String>) -> Result<Vec<u8>, EncodeError> {
    while params.last().is_some_and(String::is_empty) {
        params.pop();
    }
    encode_line(command, &params)
}

fn opt_str(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn opt_ident(value: &Option<Ident>) -> String {
    value.as_ref().map(Ident::to_string).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(name: &str, args: &[&str]) -> Frame {
        Frame {
            name: name.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn optional_mapping_for_non_zstring_types() {
        // set-banner [<text>] [<duration:float>]
        let cmd = ViewerCommand::parse(&frame("set-banner", &[])).unwrap();
        assert_eq!(
            cmd,
            ViewerCommand::SetBanner {
                text: None,
                duration: None
            }
        );

        let cmd = ViewerCommand::parse(&frame("set-banner", &["hi"])).unwrap();
        assert_eq!(
            cmd,
            ViewerCommand::SetBanner {
                text: Some("hi".into()),
                duration: None
            }
        );

        // Present-but-empty maps to absent for non-zstring types.
        let cmd = ViewerCommand::parse(&frame("set-banner", &["", "2.5"])).unwrap();
        assert_eq!(
            cmd,
            ViewerCommand::SetBanner {
                text: None,
                duration: Some(2.5)
            }
        );
    }

    #[test]
    fn zstring_keeps_empty() {
        let cmd = HostCommand::parse(&frame("send-input", &[""])).unwrap();
        assert_eq!(cmd, HostCommand::SendInput { text: String::new() });
        let cmd = HostCommand::parse(&frame("send-input", &[])).unwrap();
        assert_eq!(cmd, HostCommand::SendInput { text: String::new() });
        let cmd = HostCommand::parse(&frame("send-input", &["line\nline"])).unwrap();
        assert_eq!(
            cmd,
            HostCommand::SendInput {
                text: "line\nline".into()
            }
        );
    }

    #[test]
    fn missing_required_argument() {
        assert_eq!(
            ViewerCommand::parse(&frame("accept-user", &[])),
            Err(CommandError::MissingArgument("user"))
        );
        assert_eq!(
            ViewerCommand::parse(&frame("accept-user", &[""])),
            Err(CommandError::MissingArgument("user"))
        );
    }

    #[test]
    fn unknown_vs_wrong_direction() {
        assert!(matches!(
            ViewerCommand::parse(&frame("no-such-command", &[])),
            Err(CommandError::UnknownCommand(_))
        ));
        assert!(matches!(
            ViewerCommand::parse(&frame("tap-object", &["a", "primary", "t"])),
            Err(CommandError::WrongDirection(_))
        ));
        assert!(matches!(
            HostCommand::parse(&frame("create-object", &["room"])),
            Err(CommandError::WrongDirection(_))
        ));
    }

    #[test]
    fn raycast_cancel_is_bidirectional() {
        assert_eq!(
            ViewerCommand::parse(&frame("raycast-cancel", &[])).unwrap(),
            ViewerCommand::RaycastCancel
        );
        assert_eq!(
            HostCommand::parse(&frame("raycast-cancel", &[])).unwrap(),
            HostCommand::RaycastCancel
        );
    }

    #[test]
    fn chat_schema_differs_per_direction() {
        let cmd = ViewerCommand::parse(&frame("chat", &["alice", "hi"])).unwrap();
        assert!(matches!(cmd, ViewerCommand::Chat { .. }));
        let cmd = HostCommand::parse(&frame("chat", &["hi"])).unwrap();
        assert_eq!(cmd, HostCommand::Chat { message: "hi".into() });
    }

    #[test]
    fn create_object_round_trip() {
        let cmd = ViewerCommand::CreateObject {
            obj: Selector::parse("door-{01..03}").unwrap(),
            geom: Some(Ident::new("door_mesh").unwrap()),
        };
        let line = cmd.encode().unwrap();
        assert_eq!(line, b"create-object\tdoor-{01..03}\tdoor_mesh\r\n");
        let parsed = ViewerCommand::parse(&frame("create-object", &["door-{01..03}", "door_mesh"]))
            .unwrap();
        assert_eq!(parsed, cmd);
    }

    #[test]
    fn create_rejects_wildcards() {
        assert!(matches!(
            ViewerCommand::parse(&frame("create-object", &["door-*"])),
            Err(CommandError::BadSelector("obj", _))
        ));
        assert!(matches!(
            ViewerCommand::parse(&frame("create-geometry", &["?"])),
            Err(CommandError::BadSelector("geom", _))
        ));
    }

    #[test]
    fn destroy_accepts_wildcards() {
        assert!(ViewerCommand::parse(&frame("destroy-object", &["door-*"])).is_ok());
    }

    #[test]
    fn transform_with_interleaved_absent_channels() {
        let parsed = ViewerCommand::parse(&frame(
            "set-object-transform",
            &["ball", "", "(0 90 0)", "", "2"],
        ))
        .unwrap();
        assert_eq!(
            parsed,
            ViewerCommand::SetObjectTransform {
                obj: Selector::parse("ball").unwrap(),
                pos: None,
                rot: Some(Euler::new(0.0, 90.0, 0.0)),
                scale: None,
                duration: Some(2.0),
            }
        );
    }

    #[test]
    fn transform_encode_trims_trailing_absents() {
        let cmd = ViewerCommand::SetObjectTransform {
            obj: Selector::parse("ball").unwrap(),
            pos: Some(Vec3::new(10.0, 0.0, 0.0)),
            rot: None,
            scale: None,
            duration: None,
        };
        assert_eq!(cmd.encode().unwrap(), b"set-object-transform\tball\t(10 0 0)\r\n");
    }

    #[test]
    fn triangle_list_parses_in_groups_of_four() {
        let parsed = ViewerCommand::parse(&frame(
            "add-triangle-list",
            &["$global", "floor", "#808080", "(0 0 0)", "(1 0 0)", "(1 0 1)"],
        ))
        .unwrap();
        match parsed {
            ViewerCommand::AddTriangleList { tag, triangles, .. } => {
                assert_eq!(tag, Some(Ident::new("floor").unwrap()));
                assert_eq!(triangles.len(), 1);
                assert_eq!(triangles[0].color, Color::parse("#808080").unwrap());
                assert_eq!(triangles[0].v2, Vec3::new(1.0, 0.0, 1.0));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn triangle_list_rejects_partial_group() {
        assert!(matches!(
            ViewerCommand::parse(&frame(
                "add-triangle-list",
                &["g", "", "#ffffff", "(0 0 0)", "(1 0 0)"],
            )),
            Err(CommandError::BadTail(_))
        ));
    }

    #[test]
    fn triangle_strip_needs_three_seed_vertices() {
        assert!(matches!(
            ViewerCommand::parse(&frame(
                "add-triangle-strip",
                &["g", "", "#ffffff", "(0 0 0)", "(1 0 0)"],
            )),
            Err(CommandError::MissingArgument("p2"))
        ));
        let parsed = ViewerCommand::parse(&frame(
            "add-triangle-strip",
            &["g", "wall", "#ffffff", "(0 0 0)", "(1 0 0)", "(1 1 0)", "(0 1 0)"],
        ))
        .unwrap();
        match parsed {
            ViewerCommand::AddTriangleStrip { seed, rest, .. } => {
                assert_eq!(seed[2], Vec3::new(1.0, 1.0, 0.0));
                assert_eq!(rest, vec![Vec3::new(0.0, 1.0, 0.0)]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn hello_round_trip_with_token() {
        let token = SessionToken([9u8; 32]);
        let cmd = HostCommand::Hello {
            max_version: 2,
            uri: "hackvr://example/world".into(),
            token: Some(token),
        };
        let line = cmd.encode().unwrap();
        let text = String::from_utf8(line.clone()).unwrap();
        let parts: Vec<&str> = text.trim_end().split('\t').collect();
        assert_eq!(parts[0], "hackvr-hello");
        assert_eq!(parts[1], "v2");
        let parsed = HostCommand::parse(&frame("hackvr-hello", &parts[1..])).unwrap();
        assert_eq!(parsed, cmd);
    }

    #[test]
    fn authenticate_round_trip() {
        let cmd = HostCommand::Authenticate {
            user: UserId::new("alice").unwrap(),
            signature: [0xab; 64],
        };
        let line = cmd.encode().unwrap();
        let text = String::from_utf8(line).unwrap();
        assert!(text.contains(&"ab".repeat(64)));
        let parts: Vec<String> = text
            .trim_end()
            .split('\t')
            .skip(1)
            .map(str::to_string)
            .collect();
        let arg_refs: Vec<&str> = parts.iter().map(String::as_str).collect();
        let parsed = HostCommand::parse(&frame("authenticate", &arg_refs)).unwrap();
        assert_eq!(parsed, cmd);
    }

    #[test]
    fn nonce_hex_accepts_uppercase() {
        let parsed = ViewerCommand::parse(&frame(
            "request-authentication",
            &["alice", &"A1".repeat(16)],
        ))
        .unwrap();
        match parsed {
            ViewerCommand::RequestAuthentication { nonce, .. } => {
                assert_eq!(nonce, [0xa1; 16]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn extra_arguments_are_ignored() {
        let parsed = ViewerCommand::parse(&frame("accept-user", &["alice", "extra"])).unwrap();
        assert_eq!(
            parsed,
            ViewerCommand::AcceptUser {
                user: UserId::new("alice").unwrap()
            }
        );
    }

    #[test]
    fn direction_registry_covers_catalog() {
        assert_eq!(direction_of("chat"), Some(Direction::Either));
        assert_eq!(direction_of("set-user"), Some(Direction::ClientToServer));
        assert_eq!(
            direction_of("set-background-color"),
            Some(Direction::ServerToClient)
        );
        assert_eq!(direction_of("bogus"), None);
    }
}
