//! Server-authored scene state for HackVR viewers.
//!
//! The scene is a forest of objects rooted at `$global`, a store of
//! geometries (triangle soups, image sprites, text sprites), and an intent
//! registry, all mutated exclusively by S→C commands. Transform channels
//! animate through per-channel transitions over viewer-monotonic time, and a
//! tracking layer can aim any object at another.
//!
//! [`SceneState::apply`] is the single entry point: it expands selectors
//! against the live populations, validates atomically, and mutates. Errors
//! are optimistic-regime command errors; callers log and drop them.

pub mod error;
pub mod geometry;
pub mod graph;
pub mod intent;
pub mod math;
pub mod scene;
pub mod track;
pub mod transition;

pub use error::SceneError;
pub use geometry::{
    fan_triangles, sprite_pick_tag, strip_triangles, Geometry, GeometryStore, SpriteGeometry,
    TaggedTriangle, TextGeometry, TriangleSoup,
};
pub use graph::{Object, ObjectProps, SceneGraph};
pub use intent::IntentRegistry;
pub use math::{euler_to_quat, Transform};
pub use scene::{Banner, SceneLimits, SceneState};
pub use track::{TrackLayer, TrackTarget};
pub use transition::{Transition, TransitionSet};
