//! Viewer-side surface of the HackVR protocol.
//!
//! [`ViewerClient`] owns one connection's client state: the server-authored
//! scene, the text-input and raycast gates, the effective userid, the
//! announced session token, and the content-addressed asset cache. Inbound
//! frames become [`ViewerEvent`]s for the embedding UI; outbound helpers
//! produce encoded command lines only when their interaction gates permit.
//!
//! Rendering, windowing, and input handling are external collaborators:
//! this crate decides *what* may be sent and shown, never how.

pub mod assets;
pub mod client;
pub mod modes;

pub use assets::{AssetCache, AssetKey, AssetKind, AssetState};
pub use client::{navigation_kind, NavigationKind, PickAction, ViewerClient, ViewerEvent};
pub use modes::InteractionModes;
