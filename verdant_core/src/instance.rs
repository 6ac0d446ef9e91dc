use std::fmt;

use glam::Vec2;

use crate::species::{Species, SpeciesId};

/// Arena index of an instance within its tile. Never reused while the tile
/// lives; dead instances keep their slot with `alive` cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub u32);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inst{}", self.0)
    }
}

/// One placed plant within a tile, in tile-local coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub id: InstanceId,
    pub location: Vec2,
    /// Yaw about the vertical axis, radians.
    pub rotation: f32,
    pub scale: f32,
    pub age: f32,
    pub species: SpeciesId,
    pub alive: bool,
    /// Blockers occupy space during overlap resolution but are never
    /// exported for instantiation.
    pub blocker: bool,
}

impl Instance {
    pub fn collision_radius(&self, species: &Species) -> f32 {
        species.collision_radius * self.scale
    }

    pub fn shade_radius(&self, species: &Species) -> f32 {
        species.shade_radius * self.scale
    }

    pub fn max_radius(&self, species: &Species) -> f32 {
        species.max_radius() * self.scale
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapKind {
    /// Trunk discs intersect.
    Collision,
    /// Only the canopy discs intersect.
    Shade,
}

/// Decides which of two overlapping instances dies, if either.
///
/// `a` is the instance under evaluation and `b` the pre-existing partner from
/// the index. The comparator is total: it returns `a`'s id, `b`'s id, or
/// `None`, and never fails to decide.
///
/// Shade overlap between two instances of the same species is peaceful, and
/// a shade-overlap loser that itself grows in shade is pardoned. Collision
/// overlaps always claim their loser.
pub fn domination(
    a: &Instance,
    b: &Instance,
    kind: OverlapKind,
    table: &[Species],
) -> Option<InstanceId> {
    let a_species = &table[a.species.0 as usize];
    let b_species = &table[b.species.0 as usize];

    if kind == OverlapKind::Shade && a.species == b.species {
        return None;
    }

    let (loser, loser_species) = if a_species.overlap_priority != b_species.overlap_priority {
        if a_species.overlap_priority < b_species.overlap_priority {
            (a, a_species)
        } else {
            (b, b_species)
        }
    } else if a.max_radius(a_species) != b.max_radius(b_species) {
        if a.max_radius(a_species) < b.max_radius(b_species) {
            (a, a_species)
        } else {
            (b, b_species)
        }
    } else {
        // Exact tie: the pre-existing partner yields to the newcomer.
        (b, b_species)
    };

    if kind == OverlapKind::Shade && loser_species.grows_in_shade {
        return None;
    }

    Some(loser.id)
}
