//! Scene state facade: applies viewer-bound commands to the object graph,
//! geometry store, and intent registry.
//!
//! Selector-expanded commands are validated up front and applied as an
//! atomic batch: either every expanded application happens or the whole
//! command is dropped. Expansion order is unspecified, so every operation
//! here is order-independent and idempotent under duplicate expansion.
//!
//! Time is viewer-monotonic, passed in by the caller as a `Duration` since
//! session start; the scene never reads a clock of its own.

use std::collections::HashSet;
use std::time::Duration;

use glam::{Mat4, Quat, Vec3, Vec4Swizzles};

use hackvr_protocol::{
    Color, GeomId, Ident, ObjectId, ReparentMode, Selector, SizeMode, Tag, TrackMode,
    TriangleRecord, ViewerCommand,
};

use crate::error::SceneError;
use crate::geometry::{
    fan_triangles, strip_triangles, Geometry, GeometryStore, SpriteGeometry, TaggedTriangle,
    TextGeometry,
};
use crate::graph::SceneGraph;
use crate::math::{self, Transform};
use crate::track::TrackTarget;

/// Soft implementation limits. Exceeding one is a command error; the command
/// is dropped with no partial application.
#[derive(Debug, Clone, Copy)]
pub struct SceneLimits {
    pub max_triangles_per_geometry: usize,
    pub max_objects: usize,
    pub max_nesting: usize,
    /// Cap on concrete applications for create-family selector expansion.
    /// The bare `*` fast path is exempt (it is bounded by the population).
    pub selector_expansion_cap: usize,
}

impl Default for SceneLimits {
    fn default() -> Self {
        Self {
            max_triangles_per_geometry: 100_000,
            max_objects: 10_000,
            max_nesting: 16,
            selector_expansion_cap: 1_000,
        }
    }
}

/// A transient viewer banner.
#[derive(Debug, Clone, PartialEq)]
pub struct Banner {
    pub text: String,
    pub duration: Option<f32>,
    pub shown_at: Duration,
}

/// The full server-authored state of one connection.
#[derive(Debug)]
pub struct SceneState {
    pub graph: SceneGraph,
    pub geometries: GeometryStore,
    pub intents: crate::intent::IntentRegistry,
    pub background: Color,
    pub banner: Option<Banner>,
    free_look_enabled: bool,
    free_look: Quat,
    limits: SceneLimits,
}

impl SceneState {
    pub fn new(limits: SceneLimits) -> Self {
        Self {
            graph: SceneGraph::new(),
            geometries: GeometryStore::new(),
            intents: crate::intent::IntentRegistry::new(),
            background: Color::BLACK,
            banner: None,
            free_look_enabled: false,
            free_look: Quat::IDENTITY,
            limits,
        }
    }

    pub fn limits(&self) -> &SceneLimits {
        &self.limits
    }

    /// Apply one viewer-bound command. Session, auth, and interaction-mode
    /// commands have no scene effect and succeed as no-ops; routing them is
    /// the viewer client's job.
    pub fn apply(&mut self, cmd: &ViewerCommand, now: Duration) -> Result<(), SceneError> {
        match cmd {
            ViewerCommand::CreateGeometry { geom } => {
                for id in self.expand_create(geom, |state, id| {
                    !id.is_reserved() && !state.geometries.contains(id)
                })? {
                    self.geometries.create_soup(id)?;
                }
                Ok(())
            }
            ViewerCommand::DestroyGeometry { geom } => {
                for id in self.match_geometries(geom)? {
                    self.geometries.destroy(&id)?;
                }
                Ok(())
            }
            ViewerCommand::CreateSpriteGeometry {
                geom,
                size,
                uri,
                sha256,
                mode,
                anchor,
            } => {
                let sprite = SpriteGeometry {
                    size: *size,
                    uri: uri.clone(),
                    sha256: *sha256,
                    mode: mode.unwrap_or(SizeMode::Stretch),
                    anchor: anchor.unwrap_or_default(),
                };
                for id in self.expand_create(geom, |state, id| {
                    !id.is_reserved() && !state.geometries.contains(id)
                })? {
                    self.geometries.create_sprite(id, sprite.clone())?;
                }
                Ok(())
            }
            ViewerCommand::CreateTextGeometry {
                geom,
                size,
                font_uri,
                sha256,
                text,
                anchor,
            } => {
                let template = TextGeometry {
                    size: *size,
                    font_uri: font_uri.clone(),
                    sha256: *sha256,
                    text: text.clone(),
                    color: Color {
                        r: 255,
                        g: 255,
                        b: 255,
                    },
                    background: None,
                    anchor: anchor.unwrap_or_default(),
                };
                for id in self.expand_create(geom, |state, id| {
                    !id.is_reserved() && !state.geometries.contains(id)
                })? {
                    self.geometries.create_text(id, template.clone())?;
                }
                Ok(())
            }
            ViewerCommand::AddTriangleList {
                geom,
                tag,
                triangles,
            } => {
                let batch: Vec<TaggedTriangle> = triangles
                    .iter()
                    .map(|record: &TriangleRecord| TaggedTriangle {
                        tag: tag.clone(),
                        color: record.color,
                        vertices: [record.v0, record.v1, record.v2],
                    })
                    .collect();
                self.add_triangle_batch(geom, &batch)
            }
            ViewerCommand::AddTriangleStrip {
                geom,
                tag,
                color,
                seed,
                rest,
            } => {
                let batch = tagged(strip_triangles(*seed, rest), tag.clone(), *color);
                self.add_triangle_batch(geom, &batch)
            }
            ViewerCommand::AddTriangleFan {
                geom,
                tag,
                color,
                seed,
                rest,
            } => {
                let batch = tagged(fan_triangles(*seed, rest), tag.clone(), *color);
                self.add_triangle_batch(geom, &batch)
            }
            ViewerCommand::RemoveTriangles { geom, tag } => {
                let matched = self.match_soups(geom)?;
                for id in matched {
                    self.geometries.remove_triangles(&id, tag)?;
                }
                Ok(())
            }
            ViewerCommand::SetTextProperty { geom, prop, value } => {
                // Validate the property up front so multi-target application
                // stays atomic.
                match prop.as_str() {
                    "text" => {}
                    "color" => {
                        Color::parse(value).map_err(|_| SceneError::BadPropertyValue)?;
                    }
                    "background" if value.is_empty() => {}
                    "background" => {
                        Color::parse(value).map_err(|_| SceneError::BadPropertyValue)?;
                    }
                    _ => return Err(SceneError::UnknownProperty),
                }
                let matched = self.match_text_geometries(geom)?;
                for id in matched {
                    self.geometries.set_text_property(&id, prop, value)?;
                }
                Ok(())
            }
            ViewerCommand::CreateObject { obj, geom } => {
                let ids = self.expand_create(obj, |state, id| {
                    !id.is_reserved() && !state.graph.contains(id)
                })?;
                if self.graph.len() + ids.len() > self.limits.max_objects {
                    return Err(SceneError::LimitExceeded("object"));
                }
                for id in ids {
                    // The geometry reference is weak: a missing geometry
                    // simply renders nothing until it appears.
                    self.graph
                        .create(id, geom.clone(), self.limits.max_objects)?;
                }
                Ok(())
            }
            ViewerCommand::DestroyObject { obj } => {
                for id in self.match_destroyable_objects(obj)? {
                    self.graph.destroy(&id)?;
                }
                Ok(())
            }
            ViewerCommand::ReparentObject {
                parent,
                child,
                mode,
            } => self.reparent_batch(parent, child, mode.unwrap_or(ReparentMode::World)),
            ViewerCommand::SetObjectGeometry { obj, geom } => {
                for id in self.match_objects(obj) {
                    if let Some(object) = self.graph.get_mut(&id) {
                        object.geometry = geom.clone();
                    }
                }
                Ok(())
            }
            ViewerCommand::SetObjectProperty { obj, prop, value } => {
                self.set_object_property_batch(obj, prop, value)
            }
            ViewerCommand::SetObjectTransform {
                obj,
                pos,
                rot,
                scale,
                duration,
            } => {
                let duration = duration.unwrap_or(0.0);
                if duration < 0.0 {
                    return Err(SceneError::InvalidDuration);
                }
                let rot = rot.map(math::euler_to_quat);
                for id in self.match_objects(obj) {
                    let Some(object) = self.graph.get_mut(&id) else {
                        continue;
                    };
                    if let Some(target) = pos {
                        object
                            .transitions
                            .begin_pos(object.transform.pos, now, duration);
                        object.transform.pos = *target;
                    }
                    if let Some(target) = rot {
                        object
                            .transitions
                            .begin_rot(object.transform.rot, now, duration);
                        object.transform.rot = target;
                    }
                    if let Some(target) = scale {
                        object
                            .transitions
                            .begin_scale(object.transform.scale, now, duration);
                        object.transform.scale = *target;
                    }
                }
                Ok(())
            }
            ViewerCommand::TrackObject {
                obj,
                target,
                mode,
                duration,
            } => {
                let duration = duration.unwrap_or(0.0);
                if duration < 0.0 {
                    return Err(SceneError::InvalidDuration);
                }
                let mode = mode.unwrap_or(TrackMode::Plane);
                for id in self.match_objects(obj) {
                    // Self-tracking and tracking a descendant are ignored
                    // per object; the rest of the batch still applies.
                    if let Some(target_id) = target {
                        if *target_id == id || self.graph.is_ancestor(&id, target_id) {
                            log::debug!("ignoring self/descendant tracking for {id}");
                            continue;
                        }
                    }
                    let current = self.track_rotation(&id, now);
                    let Some(object) = self.graph.get_mut(&id) else {
                        continue;
                    };
                    let config = target.clone().map(|target| TrackTarget { target, mode });
                    object.track.reconfigure(config, current, now, duration);
                }
                Ok(())
            }
            ViewerCommand::EnableFreeLook { enabled } => {
                self.free_look_enabled = *enabled;
                if !enabled {
                    self.free_look = Quat::IDENTITY;
                }
                Ok(())
            }
            ViewerCommand::SetBackgroundColor { color } => {
                self.background = *color;
                Ok(())
            }
            ViewerCommand::SetBanner { text, duration } => {
                self.banner = text.as_ref().map(|text| Banner {
                    text: text.clone(),
                    duration: *duration,
                    shown_at: now,
                });
                Ok(())
            }
            ViewerCommand::CreateIntent { intent, label } => {
                // Upsert semantics: duplicates are fine, reserved ids allowed
                // (the predefined verbs can be relabeled).
                let ids = intent
                    .expand(self.limits.selector_expansion_cap)
                    .map_err(selector_error)?;
                for id in dedup(ids) {
                    self.intents.upsert(id, label.clone());
                }
                Ok(())
            }
            ViewerCommand::DestroyIntent { intent } => {
                self.intents.destroy(intent);
                Ok(())
            }
            // Session, auth, chat, and interaction-mode commands carry no
            // scene state.
            _ => Ok(()),
        }
    }

    /// Advance housekeeping: retire finished transitions and expired banners.
    pub fn tick(&mut self, now: Duration) {
        let ids: Vec<ObjectId> = self.graph.ids().cloned().collect();
        for id in ids {
            if let Some(object) = self.graph.get_mut(&id) {
                object.transitions.retire_finished(now);
            }
        }
        if let Some(banner) = &self.banner {
            if let Some(duration) = banner.duration {
                if now.saturating_sub(banner.shown_at).as_secs_f32() >= duration {
                    self.banner = None;
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Sampling
    // -----------------------------------------------------------------------

    /// The object's local transform with transitions sampled at `now`.
    pub fn sampled_local(&self, id: &ObjectId, now: Duration) -> Option<Transform> {
        let object = self.graph.get(id)?;
        Some(Transform {
            pos: object.transitions.sample_pos(object.transform.pos, now),
            rot: object.transitions.sample_rot(object.transform.rot, now),
            scale: object
                .transitions
                .sample_scale(object.transform.scale, now),
        })
    }

    /// The object's tracking rotation sampled at `now`. Aim targets are
    /// located with committed transforms so aim never feeds back into aim.
    pub fn track_rotation(&self, id: &ObjectId, now: Duration) -> Quat {
        let Some(object) = self.graph.get(id) else {
            return Quat::IDENTITY;
        };
        let aim = match object.track.config() {
            Some(config) if self.graph.contains(&config.target) => {
                let target_world = self
                    .graph
                    .world_transform(&config.target)
                    .map(|matrix| matrix.w_axis.xyz());
                match (target_world, self.pre_rotation_frame(id)) {
                    (Some(target), Some(frame)) => {
                        let local = frame.inverse().transform_point3(target);
                        object.track.aim(Some(local))
                    }
                    _ => Quat::IDENTITY,
                }
            }
            _ => Quat::IDENTITY,
        };
        object.track.sample(aim, now)
    }

    /// World matrix of the frame tracking aims within: the parent's world
    /// transform followed by the object's translation.
    fn pre_rotation_frame(&self, id: &ObjectId) -> Option<Mat4> {
        let object = self.graph.get(id)?;
        let parent_world = match self.graph.parent_of(id) {
            Some(parent) => self.graph.world_transform(parent)?,
            None => Mat4::IDENTITY,
        };
        Some(parent_world * Mat4::from_translation(object.transform.pos))
    }

    /// Fully sampled world transform: transitions and tracking included.
    pub fn sampled_world(&self, id: &ObjectId, now: Duration) -> Option<Mat4> {
        let local = self.sampled_local(id, now)?;
        let track = self.track_rotation(id, now);
        let matrix = local.to_matrix(track);
        match self.graph.parent_of(id) {
            Some(parent) => {
                let parent_id = parent.clone();
                Some(self.sampled_world(&parent_id, now)? * matrix)
            }
            None => Some(matrix),
        }
    }

    /// Camera render rotation: `R_track ∘ R_local ∘ R_free`.
    pub fn camera_rotation(&self, now: Duration) -> Quat {
        let camera = Ident::camera();
        let track = self.track_rotation(&camera, now);
        let local = self
            .sampled_local(&camera, now)
            .map(|transform| transform.rot)
            .unwrap_or(Quat::IDENTITY);
        track * local * self.free_look
    }

    pub fn free_look_enabled(&self) -> bool {
        self.free_look_enabled
    }

    /// Viewer-local free-look rotation; only takes effect while enabled.
    pub fn set_free_look(&mut self, rotation: Quat) {
        if self.free_look_enabled {
            self.free_look = rotation;
        }
    }

    // -----------------------------------------------------------------------
    // Selector plumbing
    // -----------------------------------------------------------------------

    /// Expand a create-family selector, dedup, and pre-validate every target
    /// with `valid` so application is all-or-nothing.
    fn expand_create(
        &self,
        selector: &Selector,
        valid: impl Fn(&Self, &Ident) -> bool,
    ) -> Result<Vec<Ident>, SceneError> {
        let ids = dedup(
            selector
                .expand(self.limits.selector_expansion_cap)
                .map_err(selector_error)?,
        );
        for id in &ids {
            if !valid(self, id) {
                return Err(if id.is_reserved() {
                    SceneError::ForbiddenIdentifier
                } else {
                    SceneError::DuplicateCreate
                });
            }
        }
        Ok(ids)
    }

    fn match_objects(&self, selector: &Selector) -> Vec<ObjectId> {
        let ids: Vec<&ObjectId> = self.graph.ids().collect();
        selector
            .select(ids.into_iter(), |id| id.as_str())
            .into_iter()
            .map(|id| (*id).clone())
            .collect()
    }

    /// Objects matched for destruction. The predefined `$global`/`$camera`
    /// are excluded from pattern matches; naming one concretely is a
    /// forbidden-identifier error.
    fn match_destroyable_objects(&self, selector: &Selector) -> Result<Vec<ObjectId>, SceneError> {
        let matched = self.match_objects(selector);
        if selector.is_concrete() {
            if matched
                .iter()
                .any(|id| *id == Ident::global() || *id == Ident::camera())
            {
                return Err(SceneError::ForbiddenIdentifier);
            }
            return Ok(matched);
        }
        Ok(matched
            .into_iter()
            .filter(|id| *id != Ident::global() && *id != Ident::camera())
            .collect())
    }

    /// Geometries matched for destruction; same reserved-id policy as
    /// objects, with `$global` the protected one.
    fn match_geometries(&self, selector: &Selector) -> Result<Vec<GeomId>, SceneError> {
        let ids: Vec<&GeomId> = self.geometries.ids().collect();
        let matched: Vec<GeomId> = selector
            .select(ids.into_iter(), |id| id.as_str())
            .into_iter()
            .map(|id| (*id).clone())
            .collect();
        if selector.is_concrete() {
            if matched.iter().any(|id| *id == Ident::global()) {
                return Err(SceneError::ForbiddenIdentifier);
            }
            return Ok(matched);
        }
        Ok(matched
            .into_iter()
            .filter(|id| *id != Ident::global())
            .collect())
    }

    /// Matched geometries that must be triangle soups. A concrete selector
    /// naming a sprite is a variant mismatch; pattern matches skip non-soups.
    fn match_soups(&self, selector: &Selector) -> Result<Vec<GeomId>, SceneError> {
        let ids: Vec<&GeomId> = self.geometries.ids().collect();
        let matched = selector.select(ids.into_iter(), |id| id.as_str());
        let mut out = Vec::new();
        for id in matched {
            match self.geometries.get(id) {
                Some(Geometry::Soup(_)) => out.push(id.clone()),
                Some(_) if selector.is_concrete() => return Err(SceneError::VariantMismatch),
                Some(_) => log::debug!("selector {selector} skipping non-soup geometry {id}"),
                None => {}
            }
        }
        Ok(out)
    }

    fn match_text_geometries(&self, selector: &Selector) -> Result<Vec<GeomId>, SceneError> {
        let ids: Vec<&GeomId> = self.geometries.ids().collect();
        let matched = selector.select(ids.into_iter(), |id| id.as_str());
        let mut out = Vec::new();
        for id in matched {
            match self.geometries.get(id) {
                Some(Geometry::Text(_)) => out.push(id.clone()),
                Some(_) if selector.is_concrete() => return Err(SceneError::VariantMismatch),
                _ => {}
            }
        }
        Ok(out)
    }

    fn add_triangle_batch(
        &mut self,
        selector: &Selector,
        batch: &[TaggedTriangle],
    ) -> Result<(), SceneError> {
        let matched = self.match_soups(selector)?;
        // Pre-check the cap everywhere so a multi-target batch is atomic.
        for id in &matched {
            let existing = self
                .geometries
                .get(id)
                .map(Geometry::triangle_count)
                .unwrap_or(0);
            if existing + batch.len() > self.limits.max_triangles_per_geometry {
                return Err(SceneError::LimitExceeded("triangle"));
            }
        }
        for id in &matched {
            self.geometries
                .add_triangles(id, batch, self.limits.max_triangles_per_geometry)?;
        }
        Ok(())
    }

    fn reparent_batch(
        &mut self,
        parent: &ObjectId,
        child: &Selector,
        mode: ReparentMode,
    ) -> Result<(), SceneError> {
        if !self.graph.contains(parent) {
            return Err(SceneError::MissingEntity("object"));
        }
        let children = self.match_children(child)?;
        // Validate against the current graph before touching anything.
        for id in &children {
            if id == parent {
                return Err(SceneError::CycleRejected);
            }
            if self.graph.is_ancestor(id, parent) {
                return Err(SceneError::CycleRejected);
            }
        }
        for id in &children {
            self.graph
                .reparent(id, parent, mode, self.limits.max_nesting)?;
        }
        Ok(())
    }

    /// Children matched for a reparent; `$global` excluded from patterns,
    /// forbidden when named concretely.
    fn match_children(&self, selector: &Selector) -> Result<Vec<ObjectId>, SceneError> {
        let matched = self.match_objects(selector);
        if selector.is_concrete() {
            if matched.iter().any(|id| *id == Ident::global()) {
                return Err(SceneError::UnreparentableRoot);
            }
            return Ok(matched);
        }
        Ok(matched
            .into_iter()
            .filter(|id| *id != Ident::global())
            .collect())
    }

    fn set_object_property_batch(
        &mut self,
        selector: &Selector,
        prop: &str,
        value: &str,
    ) -> Result<(), SceneError> {
        // Parse once, apply everywhere.
        enum Parsed {
            Clickable(bool),
            TextInput(bool),
            Href(Option<String>),
        }
        let parsed = match prop {
            "clickable" => Parsed::Clickable(parse_bool(value)?),
            "textinput" => Parsed::TextInput(parse_bool(value)?),
            "href" if value.is_empty() => Parsed::Href(None),
            "href" => Parsed::Href(Some(
                hackvr_protocol::types::parse_uri(value)
                    .map_err(|_| SceneError::BadPropertyValue)?,
            )),
            _ => return Err(SceneError::UnknownProperty),
        };
        for id in self.match_objects(selector) {
            let Some(object) = self.graph.get_mut(&id) else {
                continue;
            };
            match &parsed {
                Parsed::Clickable(flag) => object.props.clickable = *flag,
                Parsed::TextInput(flag) => object.props.textinput = *flag,
                Parsed::Href(href) => object.props.href = href.clone(),
            }
        }
        Ok(())
    }
}

impl Default for SceneState {
    fn default() -> Self {
        Self::new(SceneLimits::default())
    }
}

fn tagged(triangles: Vec<[Vec3; 3]>, tag: Option<Tag>, color: Color) -> Vec<TaggedTriangle> {
    triangles
        .into_iter()
        .map(|vertices| TaggedTriangle {
            tag: tag.clone(),
            color,
            vertices,
        })
        .collect()
}

fn dedup(ids: Vec<Ident>) -> Vec<Ident> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

fn parse_bool(value: &str) -> Result<bool, SceneError> {
    hackvr_protocol::types::parse_bool(value).map_err(|_| SceneError::BadPropertyValue)
}

fn selector_error(err: hackvr_protocol::SelectorError) -> SceneError {
    match err {
        hackvr_protocol::SelectorError::OverCap => SceneError::SelectorOverCap,
        _ => SceneError::ForbiddenIdentifier,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use hackvr_protocol::{Euler, Frame, UserId};

    fn scene() -> SceneState {
        SceneState::default()
    }

    fn secs(s: f32) -> Duration {
        Duration::from_secs_f32(s)
    }

    fn id(raw: &str) -> Ident {
        Ident::new(raw).unwrap()
    }

    fn sel(raw: &str) -> Selector {
        Selector::parse(raw).unwrap()
    }

    fn apply_line(state: &mut SceneState, line: &str, now: Duration) -> Result<(), SceneError> {
        let mut parts = line.split('\t');
        let frame = Frame {
            name: parts.next().unwrap().to_string(),
            args: parts.map(str::to_string).collect(),
        };
        let cmd = ViewerCommand::parse(&frame).expect("parse");
        state.apply(&cmd, now)
    }

    #[test]
    fn create_object_expansion_populates_exactly() {
        let mut state = scene();
        apply_line(&mut state, "create-object\tdoor-{01..03}", secs(0.0)).unwrap();
        for name in ["door-01", "door-02", "door-03"] {
            assert!(state.graph.contains(&id(name)), "{name} should exist");
        }
        assert!(!state.graph.contains(&id("door")));

        apply_line(
            &mut state,
            "set-object-property\tdoor-*\tclickable\ttrue",
            secs(0.0),
        )
        .unwrap();
        assert!(state.graph.get(&id("door-01")).unwrap().props.clickable);
        assert!(state.graph.get(&id("door-03")).unwrap().props.clickable);
    }

    #[test]
    fn duplicate_create_drops_whole_batch() {
        let mut state = scene();
        apply_line(&mut state, "create-object\tdoor-02", secs(0.0)).unwrap();
        let err = apply_line(&mut state, "create-object\tdoor-{01..03}", secs(0.0));
        assert_eq!(err, Err(SceneError::DuplicateCreate));
        assert!(!state.graph.contains(&id("door-01")), "no partial create");
        assert!(!state.graph.contains(&id("door-03")));
    }

    #[test]
    fn selector_idempotence() {
        let mut state = scene();
        apply_line(&mut state, "create-object\tball", secs(0.0)).unwrap();
        for _ in 0..2 {
            apply_line(
                &mut state,
                "set-object-transform\tball\t(1 2 3)",
                secs(0.0),
            )
            .unwrap();
        }
        assert_eq!(
            state.graph.get(&id("ball")).unwrap().transform.pos,
            Vec3::new(1.0, 2.0, 3.0)
        );

        for _ in 0..2 {
            apply_line(&mut state, "destroy-object\tball", secs(0.0)).ok();
        }
        assert!(!state.graph.contains(&id("ball")));
    }

    #[test]
    fn zero_match_selector_is_noop() {
        let mut state = scene();
        apply_line(
            &mut state,
            "set-object-property\tnothing-*\tclickable\ttrue",
            secs(0.0),
        )
        .unwrap();
    }

    #[test]
    fn transform_transition_times_out_exactly() {
        let mut state = scene();
        apply_line(&mut state, "create-object\tball", secs(0.0)).unwrap();
        apply_line(
            &mut state,
            "set-object-transform\tball\t(10 0 0)\t\t\t10",
            secs(0.0),
        )
        .unwrap();

        let at2 = state.sampled_local(&id("ball"), secs(2.0)).unwrap().pos;
        assert!((at2 - Vec3::new(2.0, 0.0, 0.0)).length() < 1e-4);

        // Re-target at t=2 with a 2 s duration: restart from ~(2,0,0).
        apply_line(
            &mut state,
            "set-object-transform\tball\t(10 0 0)\t\t\t2",
            secs(2.0),
        )
        .unwrap();
        let at3 = state.sampled_local(&id("ball"), secs(3.0)).unwrap().pos;
        assert!((at3 - Vec3::new(6.0, 0.0, 0.0)).length() < 1e-3);
        let at4 = state.sampled_local(&id("ball"), secs(4.0)).unwrap().pos;
        assert_eq!(at4, Vec3::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn negative_duration_is_dropped() {
        let mut state = scene();
        apply_line(&mut state, "create-object\tball", secs(0.0)).unwrap();
        assert_eq!(
            apply_line(
                &mut state,
                "set-object-transform\tball\t(1 0 0)\t\t\t-1",
                secs(0.0),
            ),
            Err(SceneError::InvalidDuration)
        );
        assert_eq!(
            state.graph.get(&id("ball")).unwrap().transform.pos,
            Vec3::ZERO
        );
    }

    #[test]
    fn omitted_channel_keeps_running_transition() {
        let mut state = scene();
        apply_line(&mut state, "create-object\tball", secs(0.0)).unwrap();
        apply_line(
            &mut state,
            "set-object-transform\tball\t(10 0 0)\t\t\t10",
            secs(0.0),
        )
        .unwrap();
        // Scale-only update must not disturb the position channel.
        apply_line(
            &mut state,
            "set-object-transform\tball\t\t\t(2 2 2)",
            secs(5.0),
        )
        .unwrap();
        let local = state.sampled_local(&id("ball"), secs(5.0)).unwrap();
        assert!((local.pos - Vec3::new(5.0, 0.0, 0.0)).length() < 1e-4);
        assert_eq!(local.scale, Vec3::splat(2.0));
    }

    #[test]
    fn rot_transition_lands_on_euler_quat() {
        let mut state = scene();
        apply_line(&mut state, "create-object\tball", secs(0.0)).unwrap();
        apply_line(
            &mut state,
            "set-object-transform\tball\t\t(90 0 0)\t\t2",
            secs(0.0),
        )
        .unwrap();
        let rot = state.sampled_local(&id("ball"), secs(2.0)).unwrap().rot;
        let expected = math::euler_to_quat(Euler::new(90.0, 0.0, 0.0));
        assert!(rot.dot(expected).abs() > 0.9999);
    }

    #[test]
    fn tracking_self_is_ignored() {
        let mut state = scene();
        apply_line(&mut state, "create-object\tball", secs(0.0)).unwrap();
        apply_line(&mut state, "track-object\tball\tball", secs(0.0)).unwrap();
        assert!(state.graph.get(&id("ball")).unwrap().track.config().is_none());
    }

    #[test]
    fn tracking_descendant_is_ignored() {
        let mut state = scene();
        apply_line(&mut state, "create-object\tparent", secs(0.0)).unwrap();
        apply_line(&mut state, "create-object\tkid", secs(0.0)).unwrap();
        apply_line(&mut state, "reparent-object\tparent\tkid", secs(0.0)).unwrap();
        apply_line(&mut state, "track-object\tparent\tkid", secs(0.0)).unwrap();
        assert!(state
            .graph
            .get(&id("parent"))
            .unwrap()
            .track
            .config()
            .is_none());
    }

    #[test]
    fn tracking_missing_target_is_identity_until_it_appears() {
        let mut state = scene();
        apply_line(&mut state, "create-object\twatcher", secs(0.0)).unwrap();
        apply_line(&mut state, "track-object\twatcher\tghost\tplane", secs(0.0)).unwrap();
        assert_eq!(state.track_rotation(&id("watcher"), secs(1.0)), Quat::IDENTITY);

        apply_line(&mut state, "create-object\tghost", secs(2.0)).unwrap();
        apply_line(
            &mut state,
            "set-object-transform\tghost\t(5 0 0)",
            secs(2.0),
        )
        .unwrap();
        let rotation = state.track_rotation(&id("watcher"), secs(3.0));
        let fwd = rotation * math::FORWARD;
        assert!((fwd - Vec3::X).length() < 1e-3);
    }

    #[test]
    fn camera_composes_free_look() {
        let mut state = scene();
        apply_line(&mut state, "enable-free-look\ttrue", secs(0.0)).unwrap();
        let free = Quat::from_rotation_y(0.5);
        state.set_free_look(free);
        assert!(state.camera_rotation(secs(0.0)).dot(free).abs() > 0.9999);

        apply_line(&mut state, "enable-free-look\tfalse", secs(1.0)).unwrap();
        assert!(state
            .camera_rotation(secs(1.0))
            .dot(Quat::IDENTITY)
            .abs()
            > 0.9999);
    }

    #[test]
    fn free_look_ignored_while_disabled() {
        let mut state = scene();
        state.set_free_look(Quat::from_rotation_y(1.0));
        assert!(state.camera_rotation(secs(0.0)).dot(Quat::IDENTITY).abs() > 0.9999);
    }

    #[test]
    fn minimal_scene_walkthrough() {
        let mut state = scene();
        apply_line(&mut state, "create-object\troom", secs(0.0)).unwrap();
        apply_line(
            &mut state,
            "add-triangle-list\t$global\tfloor\t#808080\t(0 0 0)\t(1 0 0)\t(1 0 1)",
            secs(0.0),
        )
        .unwrap();
        apply_line(
            &mut state,
            "set-object-property\troom\tclickable\ttrue",
            secs(0.0),
        )
        .unwrap();

        let geometry = state.geometries.get(&Ident::global()).unwrap();
        assert_eq!(geometry.triangle_count(), 1);
        assert!(state.graph.get(&id("room")).unwrap().props.clickable);
    }

    #[test]
    fn strip_into_selected_geometries() {
        let mut state = scene();
        apply_line(&mut state, "create-geometry\twall-{a,b}", secs(0.0)).unwrap();
        apply_line(
            &mut state,
            "add-triangle-strip\twall-*\tpanel\t#112233\t(0 0 0)\t(1 0 0)\t(1 1 0)\t(0 1 0)",
            secs(0.0),
        )
        .unwrap();
        for name in ["wall-a", "wall-b"] {
            assert_eq!(state.geometries.get(&id(name)).unwrap().triangle_count(), 2);
        }
    }

    #[test]
    fn destroy_star_spares_predefined() {
        let mut state = scene();
        apply_line(&mut state, "create-object\ta", secs(0.0)).unwrap();
        apply_line(&mut state, "create-object\tb", secs(0.0)).unwrap();
        apply_line(&mut state, "destroy-object\t*", secs(0.0)).unwrap();
        assert_eq!(state.graph.len(), 2);
        assert!(state.graph.contains(&Ident::global()));
        assert!(state.graph.contains(&Ident::camera()));
    }

    #[test]
    fn destroy_global_concretely_is_forbidden() {
        let mut state = scene();
        assert_eq!(
            apply_line(&mut state, "destroy-object\t$global", secs(0.0)),
            Err(SceneError::ForbiddenIdentifier)
        );
        assert_eq!(
            apply_line(&mut state, "destroy-geometry\t$global", secs(0.0)),
            Err(SceneError::ForbiddenIdentifier)
        );
    }

    #[test]
    fn href_property_validates_uri() {
        let mut state = scene();
        apply_line(&mut state, "create-object\tlink", secs(0.0)).unwrap();
        apply_line(
            &mut state,
            "set-object-property\tlink\thref\thttps://example.com/next",
            secs(0.0),
        )
        .unwrap();
        assert_eq!(
            state.graph.get(&id("link")).unwrap().props.href.as_deref(),
            Some("https://example.com/next")
        );
        assert_eq!(
            apply_line(
                &mut state,
                "set-object-property\tlink\thref\tnot a uri",
                secs(0.0),
            ),
            Err(SceneError::BadPropertyValue)
        );
        // Clearing with the empty value.
        apply_line(&mut state, "set-object-property\tlink\thref\t", secs(0.0)).unwrap();
        assert!(state.graph.get(&id("link")).unwrap().props.href.is_none());
    }

    #[test]
    fn unknown_property_is_dropped() {
        let mut state = scene();
        apply_line(&mut state, "create-object\tx", secs(0.0)).unwrap();
        assert_eq!(
            apply_line(&mut state, "set-object-property\tx\tbogus\t1", secs(0.0)),
            Err(SceneError::UnknownProperty)
        );
    }

    #[test]
    fn intent_lifecycle() {
        let mut state = scene();
        apply_line(&mut state, "create-intent\topen-door\tOpen", secs(0.0)).unwrap();
        assert!(state.intents.contains(&id("open-door")));
        apply_line(&mut state, "destroy-intent\t$forward", secs(0.0)).unwrap();
        assert!(!state.intents.contains(&id("$forward")));
    }

    #[test]
    fn banner_set_and_clear() {
        let mut state = scene();
        apply_line(&mut state, "set-banner\twelcome\t5", secs(1.0)).unwrap();
        assert_eq!(state.banner.as_ref().unwrap().text, "welcome");
        state.tick(secs(7.0));
        assert!(state.banner.is_none());

        apply_line(&mut state, "set-banner\tstays", secs(8.0)).unwrap();
        state.tick(secs(100.0));
        assert!(state.banner.is_some());
        apply_line(&mut state, "set-banner", secs(101.0)).unwrap();
        assert!(state.banner.is_none());
    }

    #[test]
    fn background_color_applies() {
        let mut state = scene();
        apply_line(&mut state, "set-background-color\t#ABCDEF", secs(0.0)).unwrap();
        assert_eq!(state.background.to_string(), "#abcdef");
    }

    #[test]
    fn non_scene_commands_are_noops() {
        let mut state = scene();
        let cmd = ViewerCommand::AcceptUser {
            user: UserId::new("alice").unwrap(),
        };
        state.apply(&cmd, secs(0.0)).unwrap();
    }

    #[test]
    fn reparent_transition_continues_in_local_space() {
        let mut state = scene();
        apply_line(&mut state, "create-object\trig", secs(0.0)).unwrap();
        apply_line(&mut state, "create-object\tball", secs(0.0)).unwrap();
        apply_line(
            &mut state,
            "set-object-transform\tball\t(10 0 0)\t\t\t10",
            secs(0.0),
        )
        .unwrap();
        apply_line(&mut state, "reparent-object\trig\tball\tlocal", secs(5.0)).unwrap();
        // The channel keeps interpolating its recorded local endpoints.
        let pos = state.sampled_local(&id("ball"), secs(5.0)).unwrap().pos;
        assert!((pos - Vec3::new(5.0, 0.0, 0.0)).length() < 1e-4);
    }
}
