//! Portal stack: an ordered sequence of affine transforms that fold space
//! back onto itself.

pub mod transform;

pub use transform::{PortalParams, PortalTransform, SINGULAR_EPSILON};

use glam::DVec3;

use crate::error::{FractalError, Result};

/// Ordered portals, indexed `0..len`. Entries are replaced whole, never
/// partially updated.
#[derive(Debug, Clone, Default)]
pub struct PortalMap {
    portals: Vec<PortalTransform>,
}

impl PortalMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_params(params: &[PortalParams]) -> Self {
        Self { portals: params.iter().map(PortalTransform::from_params).collect() }
    }

    /// A map holding only the identity portal.
    pub fn identity() -> Self {
        Self { portals: vec![PortalTransform::identity()] }
    }

    pub fn len(&self) -> usize {
        self.portals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.portals.is_empty()
    }

    pub fn push(&mut self, portal: PortalTransform) -> usize {
        self.portals.push(portal);
        self.portals.len() - 1
    }

    pub fn iter(&self) -> impl Iterator<Item = &PortalTransform> {
        self.portals.iter()
    }

    pub fn get(&self, index: usize) -> Result<&PortalTransform> {
        self.portals
            .get(index)
            .ok_or(FractalError::InvalidPortalIndex { index, len: self.portals.len() })
    }

    pub fn set(&mut self, index: usize, portal: PortalTransform) -> Result<()> {
        let len = self.portals.len();
        let slot = self
            .portals
            .get_mut(index)
            .ok_or(FractalError::InvalidPortalIndex { index, len })?;
        *slot = portal;
        Ok(())
    }

    /// `point` carried through portal `index` at iteration `k`.
    pub fn get_field_value(&self, point: DVec3, index: usize, k: usize) -> Result<DVec3> {
        Ok(self.get(index)?.apply_iterated(point, k))
    }

    /// `point` pulled back through portal `index` at iteration `k`.
    pub fn get_inv_field_value(&self, point: DVec3, index: usize, k: usize) -> Result<DVec3> {
        self.get(index)?.apply_inverse_iterated(point, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn half_turn() -> PortalTransform {
        PortalTransform::build(DVec3::splat(0.5), DVec3::new(0.0, 0.0, 90.0), DVec3::new(1.0, 0.0, 0.0))
    }

    #[test]
    fn out_of_range_index_fails() {
        let mut map = PortalMap::identity();
        assert!(matches!(
            map.get_field_value(DVec3::ZERO, 1, 1),
            Err(FractalError::InvalidPortalIndex { index: 1, len: 1 })
        ));
        assert!(map.set(3, half_turn()).is_err());
        assert!(PortalMap::new().get(0).is_err());
    }

    #[test]
    fn field_values_delegate_to_selected_portal() {
        let mut map = PortalMap::identity();
        let idx = map.push(half_turn());
        assert_eq!(idx, 1);

        let p = DVec3::new(0.2, 0.4, -0.6);
        assert_eq!(map.get_field_value(p, 0, 3).unwrap(), p);

        let forward = map.get_field_value(p, 1, 2).unwrap();
        assert!(forward.abs_diff_eq(half_turn().apply_iterated(p, 2), 1e-12));
        let back = map.get_inv_field_value(forward, 1, 2).unwrap();
        assert!(back.abs_diff_eq(p, 1e-9));
    }

    #[test]
    fn set_replaces_whole_entry() {
        let mut map = PortalMap::identity();
        map.set(0, half_turn()).unwrap();
        assert_eq!(map.get(0).unwrap().matrix(), half_turn().matrix());
    }

    #[test]
    fn from_params_preserves_order() {
        let params = [
            PortalParams::default(),
            PortalParams { position: [1.0, 2.0, 3.0], ..PortalParams::default() },
        ];
        let map = PortalMap::from_params(&params);
        assert_eq!(map.len(), 2);
        let p = map.get_field_value(DVec3::ZERO, 1, 1).unwrap();
        assert_eq!(p, DVec3::new(1.0, 2.0, 3.0));
    }
}
