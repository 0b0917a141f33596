use crate::order::AmbisonicOrder;
use crate::rotation::{BandRotation, RotationMatrix3, RotationMatrix4};
use crate::Result;
use halo_core::{AudioGraph, MatrixHandle, MatrixMixer, NodeId};

/// Sound-field rotator: one `channels × channels` [`MatrixMixer`] driven by
/// a [`BandRotation`].
///
/// Every update recomputes all bands and swaps the whole coefficient set at
/// once, so a render never mixes old and new bands. Updates go straight to
/// the running mixer; the graph is only needed to create it.
#[derive(Debug)]
pub struct Rotator {
    node: NodeId,
    mixer: MatrixHandle,
    rotation: BandRotation,
}

impl Rotator {
    pub fn new(graph: &mut AudioGraph, order: AmbisonicOrder) -> Result<Self> {
        let rotation = BandRotation::new(order);
        let channels = order.channel_count();
        let mixer = MatrixMixer::with_coefficients(channels, channels, &rotation.mixer_coefficients())?;
        let handle = mixer.handle();
        let node = graph.add(mixer);
        Ok(Self {
            node,
            mixer: handle,
            rotation,
        })
    }

    /// The mixer node; it is both input and output.
    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn set_rotation_matrix3(&mut self, matrix: &RotationMatrix3) -> Result<()> {
        self.rotation.set_matrix3(matrix);
        self.push()
    }

    pub fn set_rotation_matrix4(&mut self, matrix: &RotationMatrix4) -> Result<()> {
        self.rotation.set_matrix4(matrix);
        self.push()
    }

    pub fn rotation_matrix3(&self) -> RotationMatrix3 {
        self.rotation.matrix3()
    }

    pub fn rotation(&self) -> &BandRotation {
        &self.rotation
    }

    /// Coefficients the running mixer currently uses.
    pub fn coefficients(&self) -> Vec<f32> {
        self.mixer.coefficients()
    }

    fn push(&self) -> Result<()> {
        Ok(self.mixer.set(&self.rotation.mixer_coefficients())?)
    }
}
