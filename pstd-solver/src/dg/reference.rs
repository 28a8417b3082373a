use nalgebra::{
    DMatrix,
    DVector,
};

use crate::dg::{
    DgError,
    NUM_FACES,
    basis::{
        dmatrices_2d,
        lift_2d,
        vandermonde_2d,
    },
    nodes::{
        nodes_2d,
        xy_to_rs,
    },
};

/// Nodal basis on the reference triangle for a fixed polynomial order.
#[derive(Clone, Debug)]
pub struct ReferenceElement {
    pub order: usize,

    /// Number of nodes per element
    pub np: usize,

    /// Number of nodes per face
    pub nfp: usize,

    pub r: DVector<f64>,
    pub s: DVector<f64>,
    pub v: DMatrix<f64>,
    pub dr: DMatrix<f64>,
    pub ds: DMatrix<f64>,
    pub lift: DMatrix<f64>,
    pub face_masks: [Vec<usize>; NUM_FACES],
}

impl ReferenceElement {
    pub fn new(order: usize) -> Result<Self, DgError> {
        let (x, y) = nodes_2d(order)?;
        let (r, s) = xy_to_rs(&x, &y);
        let v = vandermonde_2d(order, &r, &s);
        let (dr, ds) = dmatrices_2d(order, &r, &s, &v)?;
        let (lift, face_masks) = lift_2d(order, &r, &s, &v)?;

        tracing::trace!(order, np = r.len(), "built reference element");

        Ok(Self {
            order,
            np: r.len(),
            nfp: order + 1,
            r,
            s,
            v,
            dr,
            ds,
            lift,
            face_masks,
        })
    }

    /// Indices of all face nodes, face by face.
    pub fn face_nodes(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.face_masks
            .iter()
            .enumerate()
            .flat_map(|(face, mask)| mask.iter().map(move |node| (face, *node)))
    }
}

#[cfg(test)]
mod tests {
    use crate::dg::reference::ReferenceElement;

    #[test]
    fn it_counts_nodes() {
        let reference = ReferenceElement::new(5).unwrap();
        assert_eq!(reference.np, 21);
        assert_eq!(reference.nfp, 6);
        assert_eq!(reference.dr.shape(), (21, 21));
        assert_eq!(reference.lift.shape(), (21, 18));
        assert_eq!(reference.face_nodes().count(), 18);
    }

    #[test]
    fn it_rejects_order_zero() {
        assert!(ReferenceElement::new(0).is_err());
    }
}
