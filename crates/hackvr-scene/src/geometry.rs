//! Geometry store: triangle soups, image sprites, and text sprites.
//!
//! A geometry id maps to exactly one variant for its whole lifetime; the
//! variant can never change once created. `$global` always exists as a
//! triangle soup. Duplicate creates are command errors, as is destroying
//! `$global`.

use std::collections::HashMap;

use glam::{Vec2, Vec3};

use hackvr_protocol::{Anchor, Color, GeomId, Ident, Selector, SizeMode, Tag};

use crate::error::SceneError;

/// One tagged triangle inside a soup. An empty (absent) tag makes the
/// triangle unreferenceable: it can never be picked or removed by selector.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedTriangle {
    pub tag: Option<Tag>,
    pub color: Color,
    pub vertices: [Vec3; 3],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleSoup {
    pub triangles: Vec<TaggedTriangle>,
}

/// A flat textured rectangle (always exactly two triangles).
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteGeometry {
    pub size: Vec2,
    pub uri: String,
    pub sha256: [u8; 32],
    pub mode: SizeMode,
    pub anchor: Anchor,
}

/// A flat text rectangle with mutable text, color, and background.
#[derive(Debug, Clone, PartialEq)]
pub struct TextGeometry {
    pub size: Vec2,
    pub font_uri: String,
    pub sha256: [u8; 32],
    pub text: String,
    pub color: Color,
    pub background: Option<Color>,
    pub anchor: Anchor,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Soup(TriangleSoup),
    Sprite(SpriteGeometry),
    Text(TextGeometry),
}

impl Geometry {
    pub fn triangle_count(&self) -> usize {
        match self {
            Geometry::Soup(soup) => soup.triangles.len(),
            // Sprites render as a two-triangle rectangle.
            Geometry::Sprite(_) | Geometry::Text(_) => 2,
        }
    }
}

/// All geometries of one connection, keyed by id.
#[derive(Debug)]
pub struct GeometryStore {
    map: HashMap<GeomId, Geometry>,
}

impl GeometryStore {
    pub fn new() -> Self {
        let mut map = HashMap::new();
        map.insert(Ident::global(), Geometry::Soup(TriangleSoup::default()));
        Self { map }
    }

    pub fn get(&self, id: &GeomId) -> Option<&Geometry> {
        self.map.get(id)
    }

    pub fn get_mut(&mut self, id: &GeomId) -> Option<&mut Geometry> {
        self.map.get_mut(id)
    }

    pub fn contains(&self, id: &GeomId) -> bool {
        self.map.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &GeomId> {
        self.map.keys()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Create an empty triangle soup. Reserved ids cannot be created (the
    /// predefined `$global` already exists).
    pub fn create_soup(&mut self, id: GeomId) -> Result<(), SceneError> {
        self.create(id, Geometry::Soup(TriangleSoup::default()))
    }

    pub fn create_sprite(&mut self, id: GeomId, sprite: SpriteGeometry) -> Result<(), SceneError> {
        self.create(id, Geometry::Sprite(sprite))
    }

    pub fn create_text(&mut self, id: GeomId, text: TextGeometry) -> Result<(), SceneError> {
        self.create(id, Geometry::Text(text))
    }

    fn create(&mut self, id: GeomId, geometry: Geometry) -> Result<(), SceneError> {
        if id.is_reserved() {
            return Err(SceneError::ForbiddenIdentifier);
        }
        if self.map.contains_key(&id) {
            return Err(SceneError::DuplicateCreate);
        }
        self.map.insert(id, geometry);
        Ok(())
    }

    pub fn destroy(&mut self, id: &GeomId) -> Result<(), SceneError> {
        if *id == Ident::global() {
            return Err(SceneError::ForbiddenIdentifier);
        }
        match self.map.remove(id) {
            Some(_) => Ok(()),
            None => Err(SceneError::MissingEntity("geometry")),
        }
    }

    /// Append triangles to a soup, checking the per-geometry cap before
    /// anything is written.
    pub fn add_triangles(
        &mut self,
        id: &GeomId,
        triangles: &[TaggedTriangle],
        cap: usize,
    ) -> Result<(), SceneError> {
        let geometry = self
            .map
            .get_mut(id)
            .ok_or(SceneError::MissingEntity("geometry"))?;
        let Geometry::Soup(soup) = geometry else {
            return Err(SceneError::VariantMismatch);
        };
        if soup.triangles.len() + triangles.len() > cap {
            return Err(SceneError::LimitExceeded("triangle"));
        }
        soup.triangles.extend_from_slice(triangles);
        Ok(())
    }

    /// Remove the soup triangles whose tag matches the selector. Untagged
    /// triangles are never removed.
    pub fn remove_triangles(&mut self, id: &GeomId, tag: &Selector) -> Result<usize, SceneError> {
        let geometry = self
            .map
            .get_mut(id)
            .ok_or(SceneError::MissingEntity("geometry"))?;
        let Geometry::Soup(soup) = geometry else {
            return Err(SceneError::VariantMismatch);
        };
        let before = soup.triangles.len();
        soup.triangles.retain(|triangle| match &triangle.tag {
            Some(triangle_tag) => !tag.matches(triangle_tag.as_str()),
            None => true,
        });
        Ok(before - soup.triangles.len())
    }

    /// Mutate a text sprite's `text`, `color`, or `background` property.
    pub fn set_text_property(
        &mut self,
        id: &GeomId,
        prop: &str,
        value: &str,
    ) -> Result<(), SceneError> {
        let geometry = self
            .map
            .get_mut(id)
            .ok_or(SceneError::MissingEntity("geometry"))?;
        let Geometry::Text(text) = geometry else {
            return Err(SceneError::VariantMismatch);
        };
        match prop {
            "text" => text.text = value.to_string(),
            "color" => {
                text.color = Color::parse(value).map_err(|_| SceneError::BadPropertyValue)?;
            }
            "background" => {
                text.background = if value.is_empty() {
                    None
                } else {
                    Some(Color::parse(value).map_err(|_| SceneError::BadPropertyValue)?)
                };
            }
            _ => return Err(SceneError::UnknownProperty),
        }
        Ok(())
    }
}

impl Default for GeometryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Expand a triangle strip: each vertex after the seed forms a triangle with
/// the two preceding vertices.
pub fn strip_triangles(seed: [Vec3; 3], rest: &[Vec3]) -> Vec<[Vec3; 3]> {
    let mut sequence = seed.to_vec();
    sequence.extend_from_slice(rest);
    sequence
        .windows(3)
        .map(|window| [window[0], window[1], window[2]])
        .collect()
}

/// Expand a triangle fan: each vertex after the seed forms a triangle with
/// the first vertex and the previous one.
pub fn fan_triangles(seed: [Vec3; 3], rest: &[Vec3]) -> Vec<[Vec3; 3]> {
    let mut out = vec![seed];
    let mut previous = seed[2];
    for &pos in rest {
        out.push([seed[0], previous, pos]);
        previous = pos;
    }
    out
}

/// The implicit pick tag of a sprite: `"<X>-<Y>"` with both coordinates in
/// `[0, 100]`, X growing left→right and Y top→bottom. Degenerate (zero-area)
/// rectangles are not hit-testable and yield no tag.
pub fn sprite_pick_tag(size: Vec2, u: f32, v: f32) -> Option<Tag> {
    if size.x <= 0.0 || size.y <= 0.0 {
        return None;
    }
    let x = (u.clamp(0.0, 1.0) * 100.0).round() as u32;
    let y = (v.clamp(0.0, 1.0) * 100.0).round() as u32;
    Ident::new(&format!("{x}-{y}")).ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> Ident {
        Ident::new(raw).unwrap()
    }

    fn white() -> Color {
        Color::parse("#ffffff").unwrap()
    }

    fn tri(tag: Option<&str>) -> TaggedTriangle {
        TaggedTriangle {
            tag: tag.map(id),
            color: white(),
            vertices: [Vec3::ZERO, Vec3::X, Vec3::Y],
        }
    }

    #[test]
    fn global_soup_is_predefined() {
        let store = GeometryStore::new();
        assert!(matches!(
            store.get(&Ident::global()),
            Some(Geometry::Soup(_))
        ));
    }

    #[test]
    fn duplicate_create_is_an_error() {
        let mut store = GeometryStore::new();
        store.create_soup(id("mesh")).unwrap();
        assert_eq!(
            store.create_soup(id("mesh")),
            Err(SceneError::DuplicateCreate)
        );
        // Variant switching via re-create is rejected the same way.
        assert_eq!(
            store.create_sprite(
                id("mesh"),
                SpriteGeometry {
                    size: Vec2::ONE,
                    uri: "https://example.com/a.png".into(),
                    sha256: [0; 32],
                    mode: SizeMode::default(),
                    anchor: Anchor::default(),
                }
            ),
            Err(SceneError::DuplicateCreate)
        );
    }

    #[test]
    fn reserved_ids_cannot_be_created() {
        let mut store = GeometryStore::new();
        assert_eq!(
            store.create_soup(id("$global")),
            Err(SceneError::ForbiddenIdentifier)
        );
        assert_eq!(
            store.create_soup(id("$mine")),
            Err(SceneError::ForbiddenIdentifier)
        );
    }

    #[test]
    fn global_cannot_be_destroyed() {
        let mut store = GeometryStore::new();
        assert_eq!(
            store.destroy(&Ident::global()),
            Err(SceneError::ForbiddenIdentifier)
        );
    }

    #[test]
    fn add_triangles_rejects_non_soup() {
        let mut store = GeometryStore::new();
        store
            .create_text(
                id("label"),
                TextGeometry {
                    size: Vec2::ONE,
                    font_uri: "https://example.com/f.ttf".into(),
                    sha256: [0; 32],
                    text: "hi".into(),
                    color: white(),
                    background: None,
                    anchor: Anchor::default(),
                },
            )
            .unwrap();
        assert_eq!(
            store.add_triangles(&id("label"), &[tri(None)], 100),
            Err(SceneError::VariantMismatch)
        );
    }

    #[test]
    fn triangle_cap_is_atomic() {
        let mut store = GeometryStore::new();
        store.create_soup(id("mesh")).unwrap();
        let batch: Vec<TaggedTriangle> = (0..3).map(|_| tri(Some("t"))).collect();
        assert_eq!(
            store.add_triangles(&id("mesh"), &batch, 2),
            Err(SceneError::LimitExceeded("triangle"))
        );
        // Nothing was written.
        assert_eq!(store.get(&id("mesh")).unwrap().triangle_count(), 0);
    }

    #[test]
    fn remove_by_tag_spares_untagged() {
        let mut store = GeometryStore::new();
        store.create_soup(id("mesh")).unwrap();
        store
            .add_triangles(
                &id("mesh"),
                &[tri(Some("wall-a")), tri(Some("wall-b")), tri(Some("floor")), tri(None)],
                100,
            )
            .unwrap();
        let removed = store
            .remove_triangles(&id("mesh"), &Selector::parse("wall-*").unwrap())
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.get(&id("mesh")).unwrap().triangle_count(), 2);

        // A bare * still never removes untagged triangles.
        let removed = store
            .remove_triangles(&id("mesh"), &Selector::parse("*").unwrap())
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.get(&id("mesh")).unwrap().triangle_count(), 1);
    }

    #[test]
    fn strip_expansion() {
        let seed = [Vec3::ZERO, Vec3::X, Vec3::Y];
        let rest = [Vec3::ONE, Vec3::Z];
        let triangles = strip_triangles(seed, &rest);
        assert_eq!(triangles.len(), 3);
        assert_eq!(triangles[1], [Vec3::X, Vec3::Y, Vec3::ONE]);
        assert_eq!(triangles[2], [Vec3::Y, Vec3::ONE, Vec3::Z]);
    }

    #[test]
    fn fan_expansion() {
        let seed = [Vec3::ZERO, Vec3::X, Vec3::Y];
        let rest = [Vec3::ONE, Vec3::Z];
        let triangles = fan_triangles(seed, &rest);
        assert_eq!(triangles.len(), 3);
        assert_eq!(triangles[1], [Vec3::ZERO, Vec3::Y, Vec3::ONE]);
        assert_eq!(triangles[2], [Vec3::ZERO, Vec3::ONE, Vec3::Z]);
    }

    #[test]
    fn text_property_mutation() {
        let mut store = GeometryStore::new();
        store
            .create_text(
                id("label"),
                TextGeometry {
                    size: Vec2::ONE,
                    font_uri: "https://example.com/f.ttf".into(),
                    sha256: [0; 32],
                    text: "old".into(),
                    color: white(),
                    background: None,
                    anchor: Anchor::default(),
                },
            )
            .unwrap();
        store.set_text_property(&id("label"), "text", "new").unwrap();
        store
            .set_text_property(&id("label"), "color", "#FF0000")
            .unwrap();
        store
            .set_text_property(&id("label"), "background", "#000000")
            .unwrap();
        match store.get(&id("label")).unwrap() {
            Geometry::Text(text) => {
                assert_eq!(text.text, "new");
                assert_eq!(text.color, Color::parse("#ff0000").unwrap());
                assert!(text.background.is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
        store
            .set_text_property(&id("label"), "background", "")
            .unwrap();
        assert!(matches!(
            store.get(&id("label")),
            Some(Geometry::Text(text)) if text.background.is_none()
        ));
        assert_eq!(
            store.set_text_property(&id("label"), "bogus", "x"),
            Err(SceneError::UnknownProperty)
        );
        assert_eq!(
            store.set_text_property(&id("label"), "color", "red"),
            Err(SceneError::BadPropertyValue)
        );
    }

    #[test]
    fn sprite_pick_tag_bounds() {
        let size = Vec2::new(2.0, 1.0);
        assert_eq!(sprite_pick_tag(size, 0.0, 0.0).unwrap().as_str(), "0-0");
        assert_eq!(sprite_pick_tag(size, 1.0, 1.0).unwrap().as_str(), "100-100");
        assert_eq!(sprite_pick_tag(size, 0.5, 0.25).unwrap().as_str(), "50-25");
        assert_eq!(sprite_pick_tag(Vec2::new(0.0, 1.0), 0.5, 0.5), None);
    }
}
