use nalgebra::{
    Point2,
    Vector2,
};

use crate::error::KernelError;

bitflags::bitflags! {
    /// Set of domain sides.
    ///
    /// `Top` is the side facing `+y`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct DomainSide: u8 {
        const TOP = 1;
        const BOTTOM = 2;
        const LEFT = 4;
        const RIGHT = 8;
        const ALL = Self::TOP.bits() | Self::BOTTOM.bits() | Self::LEFT.bits() | Self::RIGHT.bits();
    }
}

impl DomainSide {
    pub const NONE: Self = Self::empty();

    pub fn sides(&self) -> impl Iterator<Item = Side> + use<> {
        let flags = *self;
        <Side as strum::IntoEnumIterator>::iter().filter(move |side| flags.contains(side.flag()))
    }
}

impl From<Side> for DomainSide {
    fn from(value: Side) -> Self {
        value.flag()
    }
}

/// A single side of a domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::EnumIter, strum::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "lowercase")]
pub enum Side {
    Left,
    Right,
    Top,
    Bottom,
}

impl Side {
    pub fn flag(&self) -> DomainSide {
        match self {
            Self::Left => DomainSide::LEFT,
            Self::Right => DomainSide::RIGHT,
            Self::Top => DomainSide::TOP,
            Self::Bottom => DomainSide::BOTTOM,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
            Self::Top => Self::Bottom,
            Self::Bottom => Self::Top,
        }
    }

    /// Axis normal to this side.
    pub fn axis(&self) -> Axis {
        match self {
            Self::Left | Self::Right => Axis::X,
            Self::Top | Self::Bottom => Axis::Y,
        }
    }

    /// Whether the side faces towards negative coordinates.
    pub fn is_lower(&self) -> bool {
        matches!(self, Self::Left | Self::Bottom)
    }

    /// The two sides orthogonal to this one, lower one first.
    pub fn orthogonal(&self) -> [Side; 2] {
        match self.axis() {
            Axis::X => [Self::Bottom, Self::Top],
            Axis::Y => [Self::Left, Self::Right],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, strum::EnumIter, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub fn index(&self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
        }
    }

    pub fn cross(&self) -> Self {
        match self {
            Self::X => Self::Y,
            Self::Y => Self::X,
        }
    }

    /// Sides bounding a domain along this axis, lower one first.
    pub fn sides(&self) -> [Side; 2] {
        match self {
            Self::X => [Side::Left, Side::Right],
            Self::Y => [Side::Bottom, Side::Top],
        }
    }
}

/// Scene description handed to the kernel.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SceneConfig {
    #[cfg_attr(feature = "serde", serde(default))]
    pub settings: Settings,

    #[cfg_attr(feature = "serde", serde(default))]
    pub domains: Vec<DomainConfig>,

    /// Speaker positions in metres.
    #[cfg_attr(feature = "serde", serde(default))]
    pub speakers: Vec<Point2<f64>>,

    /// Receiver positions in metres.
    #[cfg_attr(feature = "serde", serde(default))]
    pub receivers: Vec<Point2<f64>>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            settings: Settings::default(),
            domains: vec![DomainConfig {
                top_left: Point2::origin(),
                size: Vector2::new(10.0, 10.0),
                edges: DomainEdges::default(),
            }],
            speakers: vec![Point2::new(4.0, 5.0)],
            receivers: vec![Point2::new(6.0, 5.0)],
        }
    }
}

impl SceneConfig {
    /// Checks everything that can be checked without laying out the grid.
    pub fn validate(&self) -> Result<(), KernelError> {
        self.settings.validate()?;

        if self.domains.is_empty() {
            return Err(KernelError::invalid("scene has no domains"));
        }

        for (index, domain) in self.domains.iter().enumerate() {
            if !(domain.size.x > 0.0 && domain.size.y > 0.0) {
                return Err(KernelError::invalid(format!(
                    "domain {index} has a non-positive size {:?}",
                    domain.size
                )));
            }
            if !domain.top_left.x.is_finite() || !domain.top_left.y.is_finite() {
                return Err(KernelError::invalid(format!(
                    "domain {index} has a non-finite position"
                )));
            }
            for side in DomainSide::ALL.sides() {
                let absorption = domain.edges[side].absorption;
                if !(0.0..=1.0).contains(&absorption) {
                    return Err(KernelError::invalid(format!(
                        "domain {index} has absorption {absorption} on its {side} side"
                    )));
                }
            }
        }

        for position in self.speakers.iter().chain(&self.receivers) {
            if !position.x.is_finite() || !position.y.is_finite() {
                return Err(KernelError::invalid("speaker or receiver position is not finite"));
            }
        }

        Ok(())
    }
}

/// Global simulation settings.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct Settings {
    /// Simulated time in seconds.
    pub render_time: f64,

    /// Speed of sound in m/s.
    pub sound_speed: f64,

    /// Maximum attenuation inside the PML layers.
    pub pml_attenuation: f64,

    /// Density of air in kg/m³.
    pub density: f64,

    /// Patch error in dB. Controls the width of the stencil window.
    ///
    /// Below about 47 dB the window gets shorter than
    /// [`Window::MIN_STABLE_LENGTH`](crate::derived::Window::MIN_STABLE_LENGTH)
    /// and long runs diverge.
    pub patch_error: f64,

    /// CFL number, the time step is `cfl * grid_spacing / sound_speed`.
    pub cfl: f64,

    /// Grid spacing in metres.
    pub grid_spacing: f64,

    /// Thickness of the PML layers in cells.
    pub pml_cells: usize,

    /// Only every `save_nth` frame is written.
    pub save_nth: usize,

    /// Sample receivers by spectral interpolation instead of picking the
    /// nearest grid point.
    pub spectral_interpolation: bool,

    /// Stage coefficients of the low storage Runge-Kutta scheme.
    pub rk_coefficients: Vec<f64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            render_time: 1.0,
            sound_speed: 340.0,
            pml_attenuation: 20000.0,
            density: 1.2,
            patch_error: 70.0,
            cfl: 0.5,
            grid_spacing: 0.2,
            pml_cells: 50,
            save_nth: 1,
            spectral_interpolation: true,
            rk_coefficients: vec![
                8.91421261e-4,
                7.555704391e-3,
                4.0919732041e-2,
                1.65919771368e-1,
                0.5,
                1.0,
            ],
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), KernelError> {
        if !(self.grid_spacing.is_finite() && self.grid_spacing > 0.0) {
            return Err(KernelError::DegenerateGeometry {
                reason: format!("grid spacing must be positive, got {}", self.grid_spacing),
            });
        }

        let positive = [
            ("sound speed", self.sound_speed),
            ("density", self.density),
            ("cfl", self.cfl),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(KernelError::invalid(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }

        if !(self.render_time.is_finite() && self.render_time >= 0.0) {
            return Err(KernelError::invalid("render time must be non-negative"));
        }
        if !(self.pml_attenuation.is_finite() && self.pml_attenuation >= 0.0) {
            return Err(KernelError::invalid("pml attenuation must be non-negative"));
        }
        if self.pml_cells == 0 {
            return Err(KernelError::invalid("pml layers need at least one cell"));
        }
        if self.save_nth == 0 {
            return Err(KernelError::invalid("save_nth must be at least 1"));
        }
        if self.rk_coefficients.len() != 6
            || self.rk_coefficients.iter().any(|c| !c.is_finite() || *c == 0.0)
        {
            return Err(KernelError::invalid(
                "expected 6 non-zero runge-kutta coefficients",
            ));
        }

        Ok(())
    }
}

/// A rectangular room.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DomainConfig {
    /// Corner with the smallest coordinates, in metres.
    pub top_left: Point2<f64>,

    /// Size in metres.
    pub size: Vector2<f64>,

    #[cfg_attr(feature = "serde", serde(default))]
    pub edges: DomainEdges,
}

impl DomainConfig {
    pub fn absorption(&self, side: Side) -> f64 {
        self.edges[side].absorption
    }

    pub fn set_absorption(&mut self, sides: DomainSide, absorption: f64) {
        for side in sides.sides() {
            self.edges[side].absorption = absorption;
        }
    }

    pub fn locally_reacting(&self, side: Side) -> bool {
        self.edges[side].locally_reacting
    }

    pub fn set_locally_reacting(&mut self, sides: DomainSide, locally_reacting: bool) {
        for side in sides.sides() {
            self.edges[side].locally_reacting = locally_reacting;
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct DomainEdges {
    pub left: EdgeConfig,
    pub right: EdgeConfig,
    pub top: EdgeConfig,
    pub bottom: EdgeConfig,
}

impl std::ops::Index<Side> for DomainEdges {
    type Output = EdgeConfig;

    fn index(&self, side: Side) -> &Self::Output {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
            Side::Top => &self.top,
            Side::Bottom => &self.bottom,
        }
    }
}

impl std::ops::IndexMut<Side> for DomainEdges {
    fn index_mut(&mut self, side: Side) -> &mut Self::Output {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
            Side::Top => &mut self.top,
            Side::Bottom => &mut self.bottom,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct EdgeConfig {
    /// Fraction of energy absorbed by the wall, in `[0, 1]`.
    pub absorption: f64,

    /// Locally reacting walls are not coupled along the wall.
    pub locally_reacting: bool,
}
