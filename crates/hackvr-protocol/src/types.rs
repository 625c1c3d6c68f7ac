//! Typed argument parsing and canonical formatting.
//!
//! Every argument type of the protocol lives here with a `parse_*` function
//! and, where the canonical form differs from arbitrary valid input, a
//! `format_*` counterpart. Round-trip law: `parse(format(v)) == v` for every
//! valid value, and `format(parse(s)) == canonicalize(s)` for every valid
//! input string (colors and hex bytes lowercase, vectors single-spaced).

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use glam::{Vec2, Vec3};
use once_cell::sync::Lazy;
use regex::Regex;

static FLOAT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").unwrap());
static INT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(0|[1-9][0-9]*)$").unwrap());
static VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^v([1-9][0-9]*)$").unwrap());
static COLOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#[0-9a-fA-F]{6}$").unwrap());
static HEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-fA-F]+$").unwrap());
static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+(-[A-Za-z0-9_]+)*$").unwrap());
static RESERVED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$[A-Za-z0-9_]+(-[A-Za-z0-9_]+)*$").unwrap());
static VEC2_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\( *(-?\d+(?:\.\d+)?) +(-?\d+(?:\.\d+)?) *\)$").unwrap());
static VEC3_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\( *(-?\d+(?:\.\d+)?) +(-?\d+(?:\.\d+)?) +(-?\d+(?:\.\d+)?) *\)$").unwrap()
});
static TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// Maximum `userid` length in Unicode code points.
pub const USERID_MAX_CHARS: usize = 127;

/// Encoded length of a session token (base64url, no padding).
pub const SESSION_TOKEN_CHARS: usize = 43;

/// Decoded length of a session token in bytes.
pub const SESSION_TOKEN_BYTES: usize = 32;

/// The reserved anonymous user.
pub const ANONYMOUS: &str = "$anonymous";

/// A typed-argument validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeError {
    what: &'static str,
}

impl TypeError {
    fn new(what: &'static str) -> Self {
        Self { what }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}", self.what)
    }
}

impl std::error::Error for TypeError {}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// A dash-grouped protocol identifier, possibly reserved (`$`-prefixed).
///
/// Used for the object, geometry, intent, and tag populations alike; the
/// grammar is identical for all four.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(String);

pub type ObjectId = Ident;
pub type GeomId = Ident;
pub type IntentId = Ident;
pub type Tag = Ident;

impl Ident {
    pub fn new(raw: &str) -> Result<Self, TypeError> {
        if IDENT_RE.is_match(raw) || RESERVED_RE.is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(TypeError::new("identifier"))
        }
    }

    /// The root object / fallback parent.
    pub fn global() -> Self {
        Self("$global".to_string())
    }

    /// The camera object.
    pub fn camera() -> Self {
        Self("$camera".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is protocol-reserved (`$`-prefixed).
    pub fn is_reserved(&self) -> bool {
        self.0.starts_with('$')
    }

    /// The dash-separated parts.
    pub fn parts(&self) -> impl Iterator<Item = &str> {
        self.0.split('-')
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// User identity
// ---------------------------------------------------------------------------

/// A connection's user identity: UTF-8, at most 127 code points, no LF, no
/// leading or trailing Unicode whitespace. `$anonymous` is the reserved
/// default.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn new(raw: &str) -> Result<Self, TypeError> {
        if raw.contains('\n') {
            return Err(TypeError::new("userid"));
        }
        if raw.trim() != raw {
            return Err(TypeError::new("userid"));
        }
        if raw.chars().count() > USERID_MAX_CHARS {
            return Err(TypeError::new("userid"));
        }
        if raw.is_empty() {
            return Err(TypeError::new("userid"));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn anonymous() -> Self {
        Self(ANONYMOUS.to_string())
    }

    pub fn is_anonymous(&self) -> bool {
        self.0 == ANONYMOUS
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Color
// ---------------------------------------------------------------------------

/// 24-bit sRGB color. Canonical text form is lowercase `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Self = Self { r: 0, g: 0, b: 0 };

    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        if !COLOR_RE.is_match(raw) {
            return Err(TypeError::new("color"));
        }
        let r = u8::from_str_radix(&raw[1..3], 16).expect("matched hex");
        let g = u8::from_str_radix(&raw[3..5], 16).expect("matched hex");
        let b = u8::from_str_radix(&raw[5..7], 16).expect("matched hex");
        Ok(Self { r, g, b })
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

// ---------------------------------------------------------------------------
// Session token
// ---------------------------------------------------------------------------

/// A session token: exactly 32 bytes, written as 43 chars of unpadded
/// base64url. Equality is by decoded bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken(pub [u8; SESSION_TOKEN_BYTES]);

impl SessionToken {
    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        if raw.len() != SESSION_TOKEN_CHARS || !TOKEN_RE.is_match(raw) {
            return Err(TypeError::new("session token"));
        }
        let decoded = URL_SAFE_NO_PAD
            .decode(raw)
            .map_err(|_| TypeError::new("session token"))?;
        let bytes: [u8; SESSION_TOKEN_BYTES] = decoded
            .try_into()
            .map_err(|_| TypeError::new("session token"))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_TOKEN_BYTES] {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&URL_SAFE_NO_PAD.encode(self.0))
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Tokens are identifiers, not credentials, but keep logs short.
        write!(f, "SessionToken({}…)", &self.to_string()[..8])
    }
}

// ---------------------------------------------------------------------------
// Euler rotation
// ---------------------------------------------------------------------------

/// Euler rotation in degrees: pan about local up (positive turns right),
/// tilt about local left (positive looks up), roll about local forward
/// (positive tilts the head right). Applied roll, then tilt, then pan.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Euler {
    pub pan: f32,
    pub tilt: f32,
    pub roll: f32,
}

impl Euler {
    pub fn new(pan: f32, tilt: f32, roll: f32) -> Self {
        Self { pan, tilt, roll }
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapKind {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SizeMode {
    #[default]
    Stretch,
    Cover,
    Contain,
    FixedWidth,
    FixedHeight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackMode {
    Plane,
    Focus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReparentMode {
    World,
    Local,
}

/// Sprite origin convention: vertical placement then horizontal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Anchor {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    #[default]
    CenterCenter,
    CenterRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl TapKind {
    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        match raw {
            "primary" => Ok(Self::Primary),
            "secondary" => Ok(Self::Secondary),
            _ => Err(TypeError::new("tapkind")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }
}

impl SizeMode {
    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        match raw {
            "stretch" => Ok(Self::Stretch),
            "cover" => Ok(Self::Cover),
            "contain" => Ok(Self::Contain),
            "fixed-width" => Ok(Self::FixedWidth),
            "fixed-height" => Ok(Self::FixedHeight),
            _ => Err(TypeError::new("sizemode")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stretch => "stretch",
            Self::Cover => "cover",
            Self::Contain => "contain",
            Self::FixedWidth => "fixed-width",
            Self::FixedHeight => "fixed-height",
        }
    }
}

impl TrackMode {
    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        match raw {
            "plane" => Ok(Self::Plane),
            "focus" => Ok(Self::Focus),
            _ => Err(TypeError::new("track-mode")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plane => "plane",
            Self::Focus => "focus",
        }
    }
}

impl ReparentMode {
    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        match raw {
            "world" => Ok(Self::World),
            "local" => Ok(Self::Local),
            _ => Err(TypeError::new("reparent-mode")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::World => "world",
            Self::Local => "local",
        }
    }
}

impl Anchor {
    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        match raw {
            "top-left" => Ok(Self::TopLeft),
            "top-center" => Ok(Self::TopCenter),
            "top-right" => Ok(Self::TopRight),
            "center-left" => Ok(Self::CenterLeft),
            "center-center" => Ok(Self::CenterCenter),
            "center-right" => Ok(Self::CenterRight),
            "bottom-left" => Ok(Self::BottomLeft),
            "bottom-center" => Ok(Self::BottomCenter),
            "bottom-right" => Ok(Self::BottomRight),
            _ => Err(TypeError::new("anchor")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TopLeft => "top-left",
            Self::TopCenter => "top-center",
            Self::TopRight => "top-right",
            Self::CenterLeft => "center-left",
            Self::CenterCenter => "center-center",
            Self::CenterRight => "center-right",
            Self::BottomLeft => "bottom-left",
            Self::BottomCenter => "bottom-center",
            Self::BottomRight => "bottom-right",
        }
    }
}

// ---------------------------------------------------------------------------
// Scalar parsers
// ---------------------------------------------------------------------------

/// Floats allow neither exponents, infinities, `NaN`, nor a leading `+`.
pub fn parse_float(raw: &str) -> Result<f32, TypeError> {
    if !FLOAT_RE.is_match(raw) {
        return Err(TypeError::new("float"));
    }
    raw.parse::<f32>().map_err(|_| TypeError::new("float"))
}

pub fn parse_int(raw: &str) -> Result<u64, TypeError> {
    if !INT_RE.is_match(raw) {
        return Err(TypeError::new("int"));
    }
    raw.parse::<u64>().map_err(|_| TypeError::new("int"))
}

pub fn parse_bool(raw: &str) -> Result<bool, TypeError> {
    match raw {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(TypeError::new("bool")),
    }
}

/// A required string must be non-empty (the empty form maps to "absent" in
/// optional positions; `zstring` is the only type that admits empty).
pub fn parse_string(raw: &str) -> Result<String, TypeError> {
    if raw.is_empty() {
        return Err(TypeError::new("string"));
    }
    Ok(raw.to_string())
}

/// `vN` protocol version; the numeric suffix.
pub fn parse_version(raw: &str) -> Result<u32, TypeError> {
    let caps = VERSION_RE.captures(raw).ok_or(TypeError::new("version"))?;
    caps[1].parse::<u32>().map_err(|_| TypeError::new("version"))
}

pub fn format_version(version: u32) -> String {
    format!("v{version}")
}

// ---------------------------------------------------------------------------
// Vector parsers
// ---------------------------------------------------------------------------

pub fn parse_vec2(raw: &str) -> Result<Vec2, TypeError> {
    let caps = VEC2_RE.captures(raw).ok_or(TypeError::new("vec2"))?;
    Ok(Vec2::new(
        caps[1].parse().map_err(|_| TypeError::new("vec2"))?,
        caps[2].parse().map_err(|_| TypeError::new("vec2"))?,
    ))
}

pub fn parse_vec3(raw: &str) -> Result<Vec3, TypeError> {
    let caps = VEC3_RE.captures(raw).ok_or(TypeError::new("vec3"))?;
    Ok(Vec3::new(
        caps[1].parse().map_err(|_| TypeError::new("vec3"))?,
        caps[2].parse().map_err(|_| TypeError::new("vec3"))?,
        caps[3].parse().map_err(|_| TypeError::new("vec3"))?,
    ))
}

pub fn parse_euler(raw: &str) -> Result<Euler, TypeError> {
    let v = parse_vec3(raw).map_err(|_| TypeError::new("euler"))?;
    Ok(Euler::new(v.x, v.y, v.z))
}

pub fn format_float(value: f32) -> String {
    // f32 Display never produces an exponent, matching the wire grammar.
    if value == value.trunc() && value.abs() < 1e9 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

pub fn format_vec2(v: Vec2) -> String {
    format!("({} {})", format_float(v.x), format_float(v.y))
}

pub fn format_vec3(v: Vec3) -> String {
    format!(
        "({} {} {})",
        format_float(v.x),
        format_float(v.y),
        format_float(v.z)
    )
}

pub fn format_euler(e: Euler) -> String {
    format_vec3(Vec3::new(e.pan, e.tilt, e.roll))
}

// ---------------------------------------------------------------------------
// Bytes
// ---------------------------------------------------------------------------

/// `bytes[N]`: exactly `2N` hex chars, either case on input; canonical form
/// (and the form used as Ed25519 signing input) is lowercase.
pub fn parse_bytes<const N: usize>(raw: &str) -> Result<[u8; N], TypeError> {
    if raw.len() != N * 2 || !HEX_RE.is_match(raw) {
        return Err(TypeError::new("bytes"));
    }
    let mut out = [0u8; N];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = u8::from_str_radix(&raw[i * 2..i * 2 + 2], 16)
            .map_err(|_| TypeError::new("bytes"))?;
    }
    Ok(out)
}

pub fn format_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

// ---------------------------------------------------------------------------
// URI and userid
// ---------------------------------------------------------------------------

/// An absolute URI. `LF` is rejected here even though the framer would carry
/// it, as is all other whitespace and every control character.
pub fn parse_uri(raw: &str) -> Result<String, TypeError> {
    if raw.is_empty()
        || raw.chars().any(|ch| ch.is_control() || ch.is_whitespace())
    {
        return Err(TypeError::new("uri"));
    }
    url::Url::parse(raw).map_err(|_| TypeError::new("uri"))?;
    Ok(raw.to_string())
}

pub fn parse_userid(raw: &str) -> Result<UserId, TypeError> {
    UserId::new(raw)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
