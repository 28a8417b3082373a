//! Scene construction.
//!
//! Rooms from the configuration are laid out on the grid, connected to
//! their neighbours and surrounded by PML layers wherever they have no
//! neighbour.

use std::ops::Range;

use nalgebra::{
    DMatrix,
    Point2,
    Vector2,
};
use pstd_util::arena::Arena;
use smallvec::{
    SmallVec,
    smallvec,
};
use strum::IntoEnumIterator;

use crate::{
    config::{
        Axis,
        DomainEdges,
        SceneConfig,
        Settings,
        Side,
    },
    derived::{
        DerivedSettings,
        round_to_cells,
    },
    domain::{
        CellRect,
        Domain,
        DomainId,
        DomainKind,
        MIN_PML_ABSORPTION,
        PmlAttenuation,
        RIGID_RHO,
        RhoMatrices,
        intersect,
    },
    error::KernelError,
};

/// Frame count and domain sizes of a configured simulation.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulationMetadata {
    pub domains: Vec<DomainMetadata>,
    pub frame_count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DomainMetadata {
    pub name: String,
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

#[derive(Clone, Debug)]
pub struct Receiver {
    /// Configured position in metres.
    pub position: Point2<f64>,

    /// Position in (fractional) grid cells.
    pub location: Point2<f64>,

    pub grid: Point2<i64>,

    /// `location - grid`, in `[0, 1)`.
    pub offset: Vector2<f64>,

    /// The room the receiver is in.
    pub container: DomainId,
}

#[derive(Clone, Debug)]
pub struct Scene {
    settings: Settings,
    derived: DerivedSettings,
    domains: Arena<Domain>,
    rooms: Vec<DomainId>,

    /// Speaker positions in metres, moved to the pressure grid.
    speakers: Vec<Point2<f64>>,
    receivers: Vec<Receiver>,
}

impl Scene {
    pub fn new(config: &SceneConfig) -> Result<Self, KernelError> {
        config.validate()?;
        let derived = DerivedSettings::new(&config.settings)?;
        let settings = config.settings.clone();
        let dx = settings.grid_spacing;
        let min_cells = derived.window.length + 1;

        if settings.pml_cells < min_cells {
            return Err(KernelError::invalid(format!(
                "pml layers have {} cells, but the stencil needs at least {min_cells}",
                settings.pml_cells
            )));
        }

        let mut scene = Self {
            settings,
            derived,
            domains: Arena::default(),
            rooms: vec![],
            speakers: vec![],
            receivers: vec![],
        };

        for (index, domain_config) in config.domains.iter().enumerate() {
            let rect = CellRect::new(
                domain_config.top_left.map(|x| round_to_cells(x, dx)),
                domain_config.size.map(|x| round_to_cells(x, dx)),
            );

            if rect.width() < min_cells || rect.height() < min_cells {
                return Err(KernelError::invalid(format!(
                    "domain {index} is {}x{} cells, but needs at least {min_cells} cells in each direction",
                    rect.width(),
                    rect.height()
                )));
            }

            for &other in &scene.rooms {
                if scene.domains[other].rect.overlaps(&rect) {
                    return Err(KernelError::invalid(format!(
                        "domain {index} overlaps {}",
                        scene.domains[other].name
                    )));
                }
            }

            let id = scene.add_domain(Domain::new(
                format!("domain{index}"),
                rect,
                DomainKind::Room { index },
                domain_config.edges,
                1.0,
                scene.settings.density,
            ));
            scene.rooms.push(id);
        }

        scene.add_pml_domains();
        scene.finalize()?;

        let half_cell = Vector2::repeat(0.5 * dx);
        scene.speakers = config
            .speakers
            .iter()
            .map(|position| position - half_cell)
            .collect();

        for position in &config.receivers {
            let location = (position - half_cell) / dx;
            let container = scene
                .rooms
                .iter()
                .copied()
                .find(|id| scene.domains[*id].rect.contains(&location))
                .ok_or_else(|| {
                    KernelError::invalid(format!(
                        "receiver at {:?} is not inside any domain",
                        position.coords
                    ))
                })?;
            let grid = location.map(|x| x.floor() as i64);
            let offset = location - grid.cast::<f64>();

            scene.receivers.push(Receiver {
                position: *position,
                location,
                grid,
                offset,
                container,
            });
        }

        tracing::debug!(
            rooms = scene.rooms.len(),
            domains = scene.domains.len(),
            speakers = scene.speakers.len(),
            receivers = scene.receivers.len(),
            frame_count = scene.derived.frame_count,
            "scene created"
        );

        Ok(scene)
    }

    /// Adds a domain and connects it to every existing domain it touches.
    fn add_domain(&mut self, domain: Domain) -> DomainId {
        let id = self.domains.insert(domain);

        let mut connections = vec![];
        let new = &self.domains[id];
        for (other_id, other) in self.domains.iter() {
            if other_id == id || !self.connectable(other_id, other, id, new) {
                continue;
            }
            if let Some(side) = Side::iter().find(|side| other.rect.touches(&new.rect, *side)) {
                connections.push((other_id, side));
            }
        }

        for (other_id, side) in connections {
            tracing::trace!(
                domain = %self.domains[id].name,
                neighbour = %self.domains[other_id].name,
                %side,
                "connecting domains"
            );
            self.domains[other_id].neighbours[side].push(id);
            self.domains[id].neighbours[side.opposite()].push(other_id);
        }

        id
    }

    fn connectable(&self, a_id: DomainId, a: &Domain, b_id: DomainId, b: &Domain) -> bool {
        if a.is_secondary_pml() && b.is_secondary_pml() {
            return false;
        }
        if (b.is_secondary_pml() && !a.is_pml()) || (a.is_secondary_pml() && !b.is_pml()) {
            return false;
        }

        if a.is_pml() && b.is_pml() {
            let serves = (b.is_secondary_pml() && b.pml_for().contains(&a_id))
                || (a.is_secondary_pml() && a.pml_for().contains(&b_id));
            if !serves {
                let siblings = match (a.pml_for(), b.pml_for()) {
                    ([a_parent], [b_parent]) => {
                        self.domains[*a_parent].neighbours.contains(*b_parent)
                    }
                    _ => false,
                };
                if !siblings || a.is_secondary_pml() != b.is_secondary_pml() {
                    return false;
                }
            }
        }

        // a pml only connects to the room it belongs to
        if a.is_pml() && !b.is_pml() && !a.pml_for().contains(&b_id) {
            return false;
        }
        if b.is_pml() && !a.is_pml() && !b.pml_for().contains(&a_id) {
            return false;
        }

        true
    }

    /// Parts of a side that have no neighbour, as contiguous cell ranges.
    fn detached_ranges(&self, id: DomainId, side: Side) -> Vec<Range<i64>> {
        let domain = &self.domains[id];
        let axis = side.axis().cross();
        let range = domain.rect.range(axis);

        let mut covered = vec![false; domain.rect.len(axis)];
        for neighbour in &domain.neighbours[side] {
            for i in intersect(self.domains[*neighbour].rect.range(axis), range.clone()) {
                covered[(i - range.start) as usize] = true;
            }
        }

        let mut runs: Vec<Range<i64>> = vec![];
        for (i, covered) in covered.into_iter().enumerate() {
            if covered {
                continue;
            }
            let cell = range.start + i as i64;
            match runs.last_mut() {
                Some(run) if run.end == cell => run.end = cell + 1,
                _ => runs.push(cell..cell + 1),
            }
        }
        runs
    }

    fn add_pml_domains(&mut self) {
        struct Corner {
            parent: usize,
            room: DomainId,
            side: Side,
            name: String,
            rect: CellRect,
            alpha: f64,
        }

        let n = self.settings.pml_cells as i64;
        let density = self.settings.density;
        let mut primaries = vec![];
        let mut corners = vec![];

        for &room_id in &self.rooms {
            let room = &self.domains[room_id];

            for side in Side::iter() {
                let runs = self.detached_ranges(room_id, side);
                let absorption = room.edges[side].absorption;
                let alpha = absorption.max(MIN_PML_ABSORPTION);
                let side_range = room.rect.range(side.axis().cross());
                let room_max = room.rect.max();

                for (run_index, run) in runs.iter().enumerate() {
                    let mut name = format!("{}_{side}", room.name);
                    if runs.len() > 1 {
                        name.push_str(&format!("_{run_index}"));
                    }

                    let len = run.end - run.start;
                    let (min, size) = match side {
                        Side::Left => (Point2::new(room.rect.min.x - n, run.start), Vector2::new(n, len)),
                        Side::Right => (Point2::new(room_max.x, run.start), Vector2::new(n, len)),
                        Side::Bottom => (Point2::new(run.start, room.rect.min.y - n), Vector2::new(len, n)),
                        Side::Top => (Point2::new(run.start, room_max.y), Vector2::new(len, n)),
                    };
                    let rect = CellRect::new(min, size);
                    let full = *run == side_range;

                    if absorption > 0.0 && full {
                        for corner_side in side.orthogonal() {
                            let other = room.edges[corner_side].absorption;
                            let offset = match corner_side {
                                Side::Left => Vector2::new(-n, 0),
                                Side::Right => Vector2::new(rect.size.x, 0),
                                Side::Bottom => Vector2::new(0, -n),
                                Side::Top => Vector2::new(0, rect.size.y),
                            };
                            corners.push(Corner {
                                parent: primaries.len(),
                                room: room_id,
                                side: corner_side,
                                name: format!("{name}_{corner_side}"),
                                rect: CellRect::new(rect.min + offset, Vector2::new(n, n)),
                                alpha: other.max(MIN_PML_ABSORPTION).min(alpha),
                            });
                        }
                    }

                    primaries.push(Domain::new(
                        name,
                        rect,
                        DomainKind::Pml {
                            pml_for: smallvec![room_id],
                            secondary: false,
                            local: !full,
                        },
                        DomainEdges::default(),
                        alpha,
                        density,
                    ));
                }
            }
        }

        let primary_ids = primaries
            .into_iter()
            .map(|domain| self.add_domain(domain))
            .collect::<Vec<_>>();

        // corners where the primary layer already continues into another layer
        // are not needed
        corners.retain(|corner| {
            self.domains[primary_ids[corner.parent]].neighbours[corner.side].is_empty()
        });
        corners.sort_by_key(|corner| (corner.rect.sort_key(), corner.room));

        // both layers meeting at a room corner produce the same corner. merge
        // them into one that serves both.
        let mut merged: Vec<(Corner, SmallVec<[DomainId; 2]>)> = vec![];
        for corner in corners {
            let parent = primary_ids[corner.parent];
            if let Some((last, pml_for)) = merged.last_mut() {
                if last.rect == corner.rect && last.room == corner.room {
                    pml_for.push(parent);
                    last.name.push('_');
                    last.name.push_str(&corner.side.to_string());
                    continue;
                }
            }
            merged.push((corner, smallvec![parent]));
        }

        let primary_count = primary_ids.len();
        let corner_count = merged.len();

        for (corner, pml_for) in merged {
            self.add_domain(Domain::new(
                corner.name,
                corner.rect,
                DomainKind::Pml {
                    pml_for,
                    secondary: true,
                    local: false,
                },
                DomainEdges::default(),
                corner.alpha,
                density,
            ));
        }

        tracing::debug!(primary_count, corner_count, "added pml layers");
    }

    fn finalize(&mut self) -> Result<(), KernelError> {
        for id in self.domains.ids() {
            let attenuation = self.pml_attenuation(id)?;
            self.domains[id].attenuation = attenuation;
        }

        for id in self.domains.ids() {
            let update_axes = self.update_axes(id);
            self.domains[id].update_axes = update_axes;
        }

        // every line that is differentiated needs enough data on both sides
        let min_cells = self.derived.window.length + 1;
        for (_, domain) in self.domains.iter() {
            if domain.is_rigid() {
                continue;
            }
            for axis in Axis::iter() {
                if !domain.should_update(axis) {
                    continue;
                }
                for side in axis.sides() {
                    for neighbour in &domain.neighbours[side] {
                        let neighbour = &self.domains[*neighbour];
                        if neighbour.rect.len(axis) < min_cells {
                            return Err(KernelError::invalid(format!(
                                "{} is too thin along {axis} to neighbour {}",
                                neighbour.name, domain.name
                            )));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn pml_attenuation(&self, id: DomainId) -> Result<Option<PmlAttenuation>, KernelError> {
        let domain = &self.domains[id];
        let has = |side: Side| !domain.neighbours[side].is_empty();

        let attenuation = match &domain.kind {
            DomainKind::Room { .. } => None,
            DomainKind::Pml {
                pml_for,
                secondary: false,
                ..
            } => {
                let side = pml_for
                    .first()
                    .and_then(|room| domain.neighbours.side_of(*room))
                    .ok_or_else(|| {
                        KernelError::DegenerateGeometry {
                            reason: format!("pml layer {} is detached from its room", domain.name),
                        }
                    })?;
                Some(PmlAttenuation::Axis {
                    axis: side.axis(),
                    ascending: side.is_lower(),
                })
            }
            DomainKind::Pml {
                secondary: true, ..
            } => {
                let horizontal = has(Side::Left) || has(Side::Right);
                let vertical = has(Side::Bottom) || has(Side::Top);
                match (horizontal, vertical) {
                    (true, true) => {
                        Some(PmlAttenuation::Corner {
                            x_ascending: has(Side::Left),
                            y_ascending: has(Side::Bottom),
                        })
                    }
                    (true, false) => {
                        Some(PmlAttenuation::Axis {
                            axis: Axis::X,
                            ascending: has(Side::Left),
                        })
                    }
                    (false, true) => {
                        Some(PmlAttenuation::Axis {
                            axis: Axis::Y,
                            ascending: has(Side::Bottom),
                        })
                    }
                    (false, false) => {
                        return Err(KernelError::DegenerateGeometry {
                            reason: format!("corner layer {} has no neighbours", domain.name),
                        });
                    }
                }
            }
        };

        Ok(attenuation)
    }

    fn update_axes(&self, id: DomainId) -> [bool; 2] {
        let domain = &self.domains[id];
        let mut axes = [true; 2];

        if let (
            DomainKind::Pml {
                pml_for,
                secondary: false,
                local,
            },
            Some(PmlAttenuation::Axis { axis, .. }),
        ) = (&domain.kind, domain.attenuation)
        {
            // along the layer the update depends on whether the wall is
            // locally reacting
            axes[axis.cross().index()] = !*local
                && pml_for.first().is_none_or(|room| {
                    let room = &self.domains[*room];
                    room.neighbours
                        .side_of(id)
                        .is_none_or(|side| !room.edges[side].locally_reacting)
                });
        }

        axes
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn derived(&self) -> &DerivedSettings {
        &self.derived
    }

    pub fn domains(&self) -> &Arena<Domain> {
        &self.domains
    }

    pub fn domain(&self, id: DomainId) -> &Domain {
        &self.domains[id]
    }

    /// Configured domains, in configuration order.
    pub fn rooms(&self) -> &[DomainId] {
        &self.rooms
    }

    pub fn speakers(&self) -> &[Point2<f64>] {
        &self.speakers
    }

    pub fn receivers(&self) -> &[Receiver] {
        &self.receivers
    }

    /// Reflection and transmission coefficients for lines of `id` between
    /// `lower` and `upper`. Missing neighbours act as rigid walls.
    pub fn rho_matrices(
        &self,
        id: DomainId,
        lower: Option<DomainId>,
        upper: Option<DomainId>,
    ) -> RhoMatrices {
        let rho = |neighbour: Option<DomainId>| {
            neighbour.map_or(RIGID_RHO, |neighbour| self.domains[neighbour].rho)
        };
        RhoMatrices::new(rho(lower), self.domains[id].rho, rho(upper))
    }

    /// Finds the neighbour on `side` whose extent along the side includes
    /// `coordinate` (in cells, bounds inclusive).
    pub fn find_neighbour_at(&self, id: DomainId, side: Side, coordinate: f64) -> Option<DomainId> {
        let axis = side.axis().cross();
        self.domains[id].neighbours[side]
            .iter()
            .copied()
            .find(|neighbour| {
                let range = self.domains[*neighbour].rect.range(axis);
                coordinate >= range.start as f64 && coordinate <= range.end as f64
            })
    }

    /// Adds the initial pulses of all speakers to a room's pressure fields.
    pub fn add_speaker_pulses(
        &self,
        id: DomainId,
        p: &mut DMatrix<f64>,
        px: &mut DMatrix<f64>,
        py: &mut DMatrix<f64>,
    ) {
        let domain = &self.domains[id];
        if domain.is_pml() {
            return;
        }

        let dx = self.settings.grid_spacing;
        let band_width = self.derived.band_width;

        for speaker in &self.speakers {
            let origin = speaker - domain.rect.min.coords.cast::<f64>() * dx;

            for column in 0..p.ncols() {
                for row in 0..p.nrows() {
                    let distance =
                        Vector2::new(column as f64 * dx - origin.x, row as f64 * dx - origin.y);
                    let pulse = (-band_width * distance.norm_squared()).exp();
                    let angle = distance.y.atan2(distance.x);

                    p[(row, column)] += pulse;
                    px[(row, column)] += angle.cos().powi(2) * pulse;
                    py[(row, column)] += angle.sin().powi(2) * pulse;
                }
            }
        }
    }

    pub fn metadata(&self) -> SimulationMetadata {
        SimulationMetadata {
            domains: self
                .rooms
                .iter()
                .map(|id| {
                    let domain = &self.domains[*id];
                    DomainMetadata {
                        name: domain.name.clone(),
                        width: domain.rect.width(),
                        height: domain.rect.height(),
                        depth: 1,
                    }
                })
                .collect(),
            frame_count: self.derived.frame_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::{
        DMatrix,
        Point2,
        Vector2,
    };

    use crate::{
        config::{
            Axis,
            DomainConfig,
            DomainEdges,
            DomainSide,
            SceneConfig,
            Settings,
            Side,
        },
        domain::{
            CellRect,
            DomainId,
            PmlAttenuation,
        },
        error::KernelError,
        scene::Scene,
    };

    /// Settings with a 4 cell stencil on a 1 m grid.
    fn small_settings() -> Settings {
        Settings {
            patch_error: 30.0,
            pml_cells: 5,
            grid_spacing: 1.0,
            render_time: 0.1,
            ..Default::default()
        }
    }

    fn room(x: f64, y: f64, w: f64, h: f64, absorption: f64) -> DomainConfig {
        let mut domain = DomainConfig {
            top_left: Point2::new(x, y),
            size: Vector2::new(w, h),
            edges: DomainEdges::default(),
        };
        domain.set_absorption(DomainSide::ALL, absorption);
        domain
    }

    fn scene(domains: Vec<DomainConfig>) -> Scene {
        Scene::new(&SceneConfig {
            settings: small_settings(),
            domains,
            speakers: vec![],
            receivers: vec![],
        })
        .unwrap()
    }

    fn find(scene: &Scene, name: &str) -> DomainId {
        scene
            .domains()
            .iter()
            .find(|(_, domain)| domain.name == name)
            .map(|(id, _)| id)
            .unwrap_or_else(|| panic!("no domain named {name}"))
    }

    #[test]
    fn it_adds_rigid_pml_layers_for_reflecting_walls() {
        let scene = scene(vec![room(0.0, 0.0, 10.0, 10.0, 0.0)]);
        assert_eq!(scene.domains().len(), 5);

        let left = scene.domain(find(&scene, "domain0_left"));
        assert!(left.is_rigid());
        assert_eq!(
            left.rect,
            CellRect::new(Point2::new(-5, 0), Vector2::new(5, 10))
        );
        assert_eq!(
            left.attenuation,
            Some(PmlAttenuation::Axis {
                axis: Axis::X,
                ascending: false
            })
        );

        let top = scene.domain(find(&scene, "domain0_top"));
        assert_eq!(
            top.attenuation,
            Some(PmlAttenuation::Axis {
                axis: Axis::Y,
                ascending: true
            })
        );

        let room = scene.domain(scene.rooms()[0]);
        assert!(!room.is_rigid());
        assert_relative_eq!(room.rho, 1.2);
        assert_eq!(room.neighbours.count(), 4);
    }

    #[test]
    fn it_merges_corner_layers() {
        let scene = scene(vec![room(0.0, 0.0, 10.0, 10.0, 1.0)]);
        assert_eq!(scene.domains().len(), 9);

        let corners = scene
            .domains()
            .iter()
            .filter(|(_, domain)| domain.is_secondary_pml())
            .collect::<Vec<_>>();
        assert_eq!(corners.len(), 4);
        for (_, corner) in &corners {
            assert_eq!(corner.pml_for().len(), 2);
            assert_eq!(corner.neighbours.count(), 2);
            assert!(!corner.is_rigid());
        }

        let (_, top_right) = corners
            .iter()
            .find(|(_, corner)| corner.rect.min == Point2::new(10, 10))
            .unwrap();
        assert_eq!(
            top_right.attenuation,
            Some(PmlAttenuation::Corner {
                x_ascending: true,
                y_ascending: true
            })
        );
        assert_eq!(top_right.rect.size, Vector2::new(5, 5));
    }

    #[test]
    fn it_connects_neighbouring_rooms() {
        let scene = scene(vec![
            room(0.0, 0.0, 10.0, 10.0, 0.5),
            room(10.0, 0.0, 10.0, 10.0, 0.5),
        ]);
        assert_eq!(scene.domains().len(), 12);

        let [a, b] = [scene.rooms()[0], scene.rooms()[1]];
        assert_eq!(scene.domain(a).neighbours[Side::Right].as_slice(), &[b]);
        assert_eq!(scene.domain(b).neighbours[Side::Left].as_slice(), &[a]);

        // the top layers of both rooms continue into each other
        let a_top = find(&scene, "domain0_top");
        let b_top = find(&scene, "domain1_top");
        assert_eq!(scene.domain(a_top).neighbours[Side::Right].as_slice(), &[b_top]);

        assert_eq!(scene.find_neighbour_at(a, Side::Right, 5.0), Some(b));
        assert_eq!(scene.find_neighbour_at(a, Side::Top, 3.0), Some(a_top));
        assert_eq!(scene.find_neighbour_at(a, Side::Right, 12.0), None);
    }

    #[test]
    fn it_adds_local_layers_for_partially_covered_sides() {
        let scene = scene(vec![
            room(0.0, 0.0, 10.0, 10.0, 0.0),
            room(10.0, 0.0, 10.0, 20.0, 0.0),
        ]);

        let local = scene.domain(find(&scene, "domain1_left"));
        assert!(local.is_local());
        assert_eq!(
            local.rect,
            CellRect::new(Point2::new(5, 10), Vector2::new(5, 10))
        );
        assert!(local.should_update(Axis::X));
        assert!(!local.should_update(Axis::Y));
    }

    #[test]
    fn it_does_not_update_along_locally_reacting_walls() {
        let mut config = room(0.0, 0.0, 10.0, 10.0, 0.3);
        config.set_locally_reacting(DomainSide::RIGHT, true);
        let scene = scene(vec![config]);

        let right = scene.domain(find(&scene, "domain0_right"));
        assert!(right.should_update(Axis::X));
        assert!(!right.should_update(Axis::Y));

        let left = scene.domain(find(&scene, "domain0_left"));
        assert!(left.should_update(Axis::X));
        assert!(left.should_update(Axis::Y));
    }

    #[test]
    fn it_uses_rigid_walls_for_missing_neighbours() {
        let scene = scene(vec![room(0.0, 0.0, 10.0, 10.0, 1.0)]);
        let room = scene.rooms()[0];
        let left = find(&scene, "domain0_left");

        let matched = scene.rho_matrices(room, Some(left), None);
        assert_relative_eq!(matched.pressure.lower_reflection(), 0.0);
        assert_relative_eq!(matched.pressure.lower_transmission(), 1.0);
        assert_relative_eq!(matched.pressure.upper_reflection(), 1.0);
    }

    #[test]
    fn it_locates_receivers() {
        let scene = Scene::new(&SceneConfig::default()).unwrap();
        let receiver = &scene.receivers()[0];
        assert_eq!(receiver.container, scene.rooms()[0]);
        assert_eq!(receiver.grid, Point2::new(29, 24));
        assert_relative_eq!(receiver.offset.x, 0.5, epsilon = 1e-9);
        assert_relative_eq!(receiver.offset.y, 0.5, epsilon = 1e-9);

        let metadata = scene.metadata();
        assert_eq!(metadata.domains.len(), 1);
        assert_eq!(metadata.domains[0].width, 50);
        assert_eq!(metadata.domains[0].height, 50);
        assert_eq!(metadata.domains[0].depth, 1);
        assert_eq!(metadata.frame_count, scene.derived().frame_count);
    }

    #[test]
    fn it_splits_speaker_pulses() {
        let scene = Scene::new(&SceneConfig::default()).unwrap();
        let room = scene.rooms()[0];

        let mut p = DMatrix::zeros(50, 50);
        let mut px = DMatrix::zeros(50, 50);
        let mut py = DMatrix::zeros(50, 50);
        scene.add_speaker_pulses(room, &mut p, &mut px, &mut py);

        // the speaker at (4, 5) sits between cells 19/20 and 24/25
        assert!(p[(24, 19)] > 0.5);
        assert!(p[(0, 49)] < 1e-12);
        for (a, (b, c)) in p.iter().zip(px.iter().zip(py.iter())) {
            assert_relative_eq!(*a, b + c, epsilon = 1e-12);
        }
    }

    #[test]
    fn it_rejects_invalid_scenes() {
        let overlapping = SceneConfig {
            settings: small_settings(),
            domains: vec![
                room(0.0, 0.0, 10.0, 10.0, 0.0),
                room(5.0, 5.0, 10.0, 10.0, 0.0),
            ],
            speakers: vec![],
            receivers: vec![],
        };
        assert!(matches!(
            Scene::new(&overlapping),
            Err(KernelError::InvalidConfiguration { .. })
        ));

        let outside = SceneConfig {
            settings: small_settings(),
            domains: vec![room(0.0, 0.0, 10.0, 10.0, 0.0)],
            speakers: vec![],
            receivers: vec![Point2::new(20.0, 3.0)],
        };
        assert!(Scene::new(&outside).is_err());

        let tiny = SceneConfig {
            settings: small_settings(),
            domains: vec![room(0.0, 0.0, 3.0, 10.0, 0.0)],
            speakers: vec![],
            receivers: vec![],
        };
        assert!(Scene::new(&tiny).is_err());

        let mut thin_pml = SceneConfig::default();
        thin_pml.settings.pml_cells = 10;
        assert!(Scene::new(&thin_pml).is_err());
    }
}
