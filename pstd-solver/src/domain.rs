use std::ops::{
    Index,
    IndexMut,
    Range,
};

use nalgebra::{
    Point2,
    Vector2,
};
use pstd_util::arena::Id;
use smallvec::SmallVec;

use crate::config::{
    Axis,
    DomainEdges,
    Side,
};

pub type DomainId = Id<Domain>;

/// Density used for missing neighbours and rigid domains.
pub const RIGID_RHO: f64 = 1e200;

/// Domains with an impedance above this are rigid and never updated.
pub const RIGID_IMPEDANCE: f64 = 1000.0;

/// Smallest absorption used for PML layers.
pub const MIN_PML_ABSORPTION: f64 = 1e-9;

/// Axis aligned rectangle of grid cells.
///
/// `max` is exclusive. `y` grows towards the top.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellRect {
    pub min: Point2<i64>,
    pub size: Vector2<i64>,
}

impl CellRect {
    pub fn new(min: Point2<i64>, size: Vector2<i64>) -> Self {
        Self { min, size }
    }

    pub fn max(&self) -> Point2<i64> {
        self.min + self.size
    }

    pub fn width(&self) -> usize {
        self.size.x.max(0) as usize
    }

    pub fn height(&self) -> usize {
        self.size.y.max(0) as usize
    }

    /// Number of cells along `axis`.
    pub fn len(&self, axis: Axis) -> usize {
        match axis {
            Axis::X => self.width(),
            Axis::Y => self.height(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size.x <= 0 || self.size.y <= 0
    }

    pub fn range(&self, axis: Axis) -> Range<i64> {
        let i = axis.index();
        self.min[i]..self.min[i] + self.size[i]
    }

    /// Coordinate of the boundary line on `side`.
    pub fn side_coordinate(&self, side: Side) -> i64 {
        match side {
            Side::Left => self.min.x,
            Side::Right => self.min.x + self.size.x,
            Side::Bottom => self.min.y,
            Side::Top => self.min.y + self.size.y,
        }
    }

    /// Whether `other` shares a boundary with this rectangle on `side`.
    pub fn touches(&self, other: &CellRect, side: Side) -> bool {
        let along = side.axis().cross();
        self.side_coordinate(side) == other.side_coordinate(side.opposite())
            && !intersect(self.range(along), other.range(along)).is_empty()
    }

    pub fn overlaps(&self, other: &CellRect) -> bool {
        !intersect(self.range(Axis::X), other.range(Axis::X)).is_empty()
            && !intersect(self.range(Axis::Y), other.range(Axis::Y)).is_empty()
    }

    /// Strict containment of a point given in cell coordinates.
    pub fn contains(&self, point: &Point2<f64>) -> bool {
        let max = self.max();
        point.x > self.min.x as f64
            && point.x < max.x as f64
            && point.y > self.min.y as f64
            && point.y < max.y as f64
    }

    pub(crate) fn sort_key(&self) -> (i64, i64, i64, i64) {
        (self.min.x, self.min.y, self.size.x, self.size.y)
    }
}

pub fn intersect(a: Range<i64>, b: Range<i64>) -> Range<i64> {
    a.start.max(b.start)..a.end.min(b.end)
}

/// What kind of field a derivative is computed for.
///
/// Pressure lives on cell centers, velocities on cell faces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum Quantity {
    Pressure,
    Velocity,
}

impl Quantity {
    /// Offset of the stencils into the neighbour data.
    pub fn shift(&self) -> usize {
        match self {
            Self::Pressure => 0,
            Self::Velocity => 1,
        }
    }

    /// Number of derivative values for a line of `len` values.
    pub fn output_len(&self, len: usize) -> usize {
        match self {
            Self::Pressure => len + 1,
            Self::Velocity => len - 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DomainKind {
    /// A room from the scene configuration.
    Room { index: usize },

    /// A perfectly matched layer.
    Pml {
        /// Domains this layer is attached to. For primary layers this is the
        /// room, for secondary (corner) layers these are primary layers.
        pml_for: SmallVec<[DomainId; 2]>,
        secondary: bool,

        /// The layer covers only part of its room's side.
        local: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PmlAttenuation {
    Axis { axis: Axis, ascending: bool },
    Corner { x_ascending: bool, y_ascending: bool },
}

impl PmlAttenuation {
    /// Direction of attenuation along `axis`, if any.
    pub fn along(&self, axis: Axis) -> Option<bool> {
        match *self {
            Self::Axis {
                axis: attenuated,
                ascending,
            } => (attenuated == axis).then_some(ascending),
            Self::Corner {
                x_ascending,
                y_ascending,
            } => {
                Some(match axis {
                    Axis::X => x_ascending,
                    Axis::Y => y_ascending,
                })
            }
        }
    }
}

/// Neighbouring domains per side.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Neighbours {
    pub left: SmallVec<[DomainId; 2]>,
    pub right: SmallVec<[DomainId; 2]>,
    pub top: SmallVec<[DomainId; 2]>,
    pub bottom: SmallVec<[DomainId; 2]>,
}

impl Neighbours {
    pub fn iter(&self) -> impl Iterator<Item = (Side, DomainId)> + '_ {
        <Side as strum::IntoEnumIterator>::iter()
            .flat_map(move |side| self[side].iter().map(move |id| (side, *id)))
    }

    pub fn contains(&self, id: DomainId) -> bool {
        self.iter().any(|(_, neighbour)| neighbour == id)
    }

    pub fn side_of(&self, id: DomainId) -> Option<Side> {
        self.iter()
            .find_map(|(side, neighbour)| (neighbour == id).then_some(side))
    }

    pub fn count(&self) -> usize {
        self.left.len() + self.right.len() + self.top.len() + self.bottom.len()
    }
}

impl Index<Side> for Neighbours {
    type Output = SmallVec<[DomainId; 2]>;

    fn index(&self, side: Side) -> &Self::Output {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
            Side::Top => &self.top,
            Side::Bottom => &self.bottom,
        }
    }
}

impl IndexMut<Side> for Neighbours {
    fn index_mut(&mut self, side: Side) -> &mut Self::Output {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
            Side::Top => &mut self.top,
            Side::Bottom => &mut self.bottom,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Domain {
    pub name: String,
    pub rect: CellRect,
    pub kind: DomainKind,
    pub edges: DomainEdges,
    pub alpha: f64,
    pub impedance: f64,
    pub rho: f64,
    pub neighbours: Neighbours,
    pub attenuation: Option<PmlAttenuation>,

    /// Whether derivatives along x (index 0) and y (index 1) are computed.
    pub update_axes: [bool; 2],
}

impl Domain {
    pub fn new(
        name: String,
        rect: CellRect,
        kind: DomainKind,
        edges: DomainEdges,
        alpha: f64,
        density: f64,
    ) -> Self {
        let impedance = impedance(alpha);
        let rho = if impedance < RIGID_IMPEDANCE {
            density * impedance
        }
        else {
            RIGID_RHO
        };

        Self {
            name,
            rect,
            kind,
            edges,
            alpha,
            impedance,
            rho,
            neighbours: Default::default(),
            attenuation: None,
            update_axes: [true; 2],
        }
    }

    pub fn is_pml(&self) -> bool {
        matches!(self.kind, DomainKind::Pml { .. })
    }

    pub fn is_secondary_pml(&self) -> bool {
        matches!(
            self.kind,
            DomainKind::Pml {
                secondary: true,
                ..
            }
        )
    }

    pub fn is_local(&self) -> bool {
        matches!(self.kind, DomainKind::Pml { local: true, .. })
    }

    pub fn is_rigid(&self) -> bool {
        self.impedance > RIGID_IMPEDANCE
    }

    pub fn room_index(&self) -> Option<usize> {
        match self.kind {
            DomainKind::Room { index } => Some(index),
            DomainKind::Pml { .. } => None,
        }
    }

    pub fn pml_for(&self) -> &[DomainId] {
        match &self.kind {
            DomainKind::Room { .. } => &[],
            DomainKind::Pml { pml_for, .. } => pml_for,
        }
    }

    pub fn should_update(&self, axis: Axis) -> bool {
        self.update_axes[axis.index()]
    }

    /// `(rows, columns)` of the pressure arrays.
    pub fn shape(&self) -> (usize, usize) {
        (self.rect.height(), self.rect.width())
    }
}

/// Normalized impedance of a wall with absorption coefficient `alpha`.
pub fn impedance(alpha: f64) -> f64 {
    let r = (1.0 - alpha).sqrt();
    -(r + 1.0) / (r - 1.0)
}

/// Reflection and transmission coefficients at the two ends of a line.
///
/// Rows are lower reflection, upper reflection, lower transmission and
/// upper transmission.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RhoMatrix(pub [[f64; 2]; 4]);

impl RhoMatrix {
    pub fn lower_reflection(&self) -> f64 {
        self.0[0][0]
    }

    pub fn upper_reflection(&self) -> f64 {
        self.0[1][0]
    }

    pub fn lower_transmission(&self) -> f64 {
        self.0[2][1]
    }

    pub fn upper_transmission(&self) -> f64 {
        self.0[3][1]
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RhoMatrices {
    pub pressure: RhoMatrix,
    pub velocity: RhoMatrix,
}

impl RhoMatrices {
    /// Coefficients for a domain with density `rho` between domains with
    /// densities `lower` and `upper`.
    pub fn new(lower: f64, rho: f64, upper: f64) -> Self {
        let coefficients = |neighbour: f64| {
            let z = neighbour / rho;
            let r1 = (z - 1.0) / (z + 1.0);
            let r2 = (z.recip() - 1.0) / (z.recip() + 1.0);
            let t1 = 2.0 * z / (z + 1.0);
            let t2 = 2.0 * z.recip() / (z.recip() + 1.0);
            (r1, r2, t1, t2)
        };

        let (rl1, rl2, tl1, tl2) = coefficients(lower);
        let (rr1, rr2, tr1, tr2) = coefficients(upper);

        Self {
            pressure: RhoMatrix([[rl1, rl2], [rr1, rr2], [tl1, tl2], [tr1, tr2]]),
            velocity: RhoMatrix([[-rl1, -rl2], [-rr1, -rr2], [tl2, tl1], [tr2, tr1]]),
        }
    }

    pub fn get(&self, quantity: Quantity) -> &RhoMatrix {
        match quantity {
            Quantity::Pressure => &self.pressure,
            Quantity::Velocity => &self.velocity,
        }
    }
}
