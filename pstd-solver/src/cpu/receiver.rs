use nalgebra::DMatrix;

use crate::{
    config::{
        Axis,
        Side,
    },
    cpu::{
        DomainForEach,
        PstdCpuSolverInstance,
        PstdCpuSolverState,
    },
    derivative::{
        Lines,
        Stencil,
        transform_length,
        windowed_derivative,
    },
    domain::{
        DomainId,
        Quantity,
    },
    error::KernelError,
    scene::Receiver,
};

impl<Threading> PstdCpuSolverInstance<Threading>
where
    Threading: DomainForEach,
{
    /// Pressure at a receiver.
    ///
    /// With spectral interpolation the pressure of the container and its
    /// vertical neighbours is shifted horizontally by the receiver's
    /// sub-cell offset, and the shifted column is then shifted vertically.
    pub(super) fn sample_receiver(
        &self,
        state: &PstdCpuSolverState,
        receiver: &Receiver,
    ) -> Result<f64, KernelError> {
        if !self.scene.settings().spectral_interpolation {
            return Ok(self.sample_nearest(state, receiver));
        }

        let container = receiver.container;
        let min_cells = self.scene.derived().window.length + 1;
        let neighbour = |side: Side| -> Result<Option<DomainId>, (Side, &'static str)> {
            let domain = self.scene.domain(container);
            if domain.neighbours[side].is_empty() {
                return Ok(None);
            }
            let id = self
                .scene
                .find_neighbour_at(container, side, receiver.location.x)
                .ok_or((side, "no neighbour next to receiver"))?;

            // the neighbour is shifted along X too
            let neighbour = self.scene.domain(id);
            if !neighbour.should_update(Axis::X) || neighbour.rect.width() < min_cells {
                return Err((side, "neighbour next to receiver can't be shifted"));
            }
            Ok(Some(id))
        };

        let (bottom, top) = match (neighbour(Side::Bottom), neighbour(Side::Top)) {
            (Ok(bottom), Ok(top)) => (bottom, top),
            (Err((side, reason)), _) | (_, Err((side, reason))) => {
                tracing::warn!(
                    position = ?receiver.position,
                    %side,
                    "{reason}, falling back to nearest sample"
                );
                return Ok(self.sample_nearest(state, receiver));
            }
        };

        let shifted_container = self.shift_horizontally(state, container, receiver.offset.x)?;
        let shifted_bottom = bottom
            .map(|id| self.shift_horizontally(state, id, receiver.offset.x))
            .transpose()?;
        let shifted_top = top
            .map(|id| self.shift_horizontally(state, id, receiver.offset.x))
            .transpose()?;

        let column = |id: DomainId| (receiver.grid.x - self.scene.domain(id).rect.min.x) as usize;

        let own = Lines::along(&shifted_container, Axis::Y, column(container));
        let lower = bottom
            .zip(shifted_bottom.as_ref())
            .map_or(own, |(id, shifted)| Lines::along(shifted, Axis::Y, column(id)));
        let upper = top
            .zip(shifted_top.as_ref())
            .map_or(own, |(id, shifted)| Lines::along(shifted, Axis::Y, column(id)));

        let scene = &*self.scene;
        let domain = scene.domain(container);
        let window = &scene.derived().window;
        let discretization = self.wisdom.discretizations.get_discretization(
            scene.settings().grid_spacing,
            transform_length(window.length, domain.rect.height()),
        );
        let factors = discretization.shift_factors(receiver.offset.y);
        let rho = scene.rho_matrices(container, bottom, top);
        let stencil = Stencil {
            window,
            quantity: Quantity::Pressure,
            rho: &rho.pressure,
            factors: &factors,
        };

        let mut out = DMatrix::zeros(domain.rect.height() + 1, 1);
        windowed_derivative(
            &self.wisdom,
            &stencil,
            1,
            own,
            lower,
            upper,
            &mut out,
            Axis::Y,
            0,
        )?;

        let row = receiver.grid.y - domain.rect.min.y;
        Ok(out[(row as usize, 0)])
    }

    /// Pressure of `id` shifted by `offset` cells along X. One column wider
    /// than the domain.
    fn shift_horizontally(
        &self,
        state: &PstdCpuSolverState,
        id: DomainId,
        offset: f64,
    ) -> Result<DMatrix<f64>, KernelError> {
        let domain = self.scene.domain(id);
        let (h, w) = domain.shape();
        let discretization = self.wisdom.discretizations.get_discretization(
            self.scene.settings().grid_spacing,
            transform_length(self.scene.derived().window.length, w),
        );
        let factors = discretization.shift_factors(offset);

        let mut shifted = DMatrix::zeros(h, w + 1);
        self.calculate(
            &state.fields,
            id,
            Axis::X,
            Quantity::Pressure,
            Some(&factors),
            &mut shifted,
        )?;
        Ok(shifted)
    }

    fn sample_nearest(&self, state: &PstdCpuSolverState, receiver: &Receiver) -> f64 {
        let domain = self.scene.domain(receiver.container);
        let p = &state.fields[receiver.container.index()].p;
        let local = receiver.location - domain.rect.min.coords.cast::<f64>();
        let index = |value: f64, len: usize| (value.round().max(0.0) as usize).min(len - 1);
        p[(index(local.y, p.nrows()), index(local.x, p.ncols()))]
    }
}
