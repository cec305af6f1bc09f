//! The unified dataset description.
//!
//! Every supported format resolves into a [`Dataset`]: a
//! [`SequenceDescription`] (timepoints, view setups, classification entities
//! and one [`ImageLoader`]) plus the [`ViewRegistrations`] placing each view
//! in physical space. All types are immutable once constructed.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use tracing::debug;

use crate::backend::ImageLoader;
use crate::error::DescriptorError;
use crate::io::Location;

// =============================================================================
// Identifiers and entities
// =============================================================================

/// A (timepoint, setup) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ViewId {
    pub timepoint: u32,
    pub setup: u32,
}

impl ViewId {
    pub const fn new(timepoint: u32, setup: u32) -> Self {
        Self { timepoint, setup }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimePoint {
    pub id: u32,
}

/// Imaging channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub id: u32,
    pub name: Option<String>,
}

impl Channel {
    pub fn new(id: u32) -> Self {
        Self { id, name: None }
    }

    pub fn named(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: Some(name.into()),
        }
    }
}

/// Acquisition angle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Angle {
    pub id: u32,
    pub name: Option<String>,
}

impl Angle {
    pub fn new(id: u32) -> Self {
        Self { id, name: None }
    }
}

/// Illumination direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Illumination {
    pub id: u32,
    pub name: Option<String>,
}

impl Illumination {
    pub fn new(id: u32) -> Self {
        Self { id, name: None }
    }
}

// =============================================================================
// View setups
// =============================================================================

/// Physical size of one voxel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoxelSize {
    pub unit: String,
    /// Extent along x, y, z
    pub dimensions: [f64; 3],
}

/// One channel/angle/illumination configuration.
///
/// Geometry is optional: producers sometimes omit it, and such setups are kept
/// so registrations referring to them stay resolvable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewSetup {
    pub id: u32,
    pub name: Option<String>,
    /// Image size in pixels along x, y, z
    pub size: Option<[u64; 3]>,
    pub voxel_size: Option<VoxelSize>,
    pub channel: u32,
    pub angle: u32,
    pub illumination: u32,
}

impl ViewSetup {
    /// A setup without geometry, on channel/angle/illumination 0.
    pub fn new(id: u32) -> Self {
        Self {
            id,
            name: None,
            size: None,
            voxel_size: None,
            channel: 0,
            angle: 0,
            illumination: 0,
        }
    }

    pub fn has_geometry(&self) -> bool {
        self.size.is_some() && self.voxel_size.is_some()
    }
}

// =============================================================================
// Registrations
// =============================================================================

/// 3D affine transform stored row-major as a 3×4 matrix.
///
/// Coefficients are `[m00 m01 m02 t0 m10 m11 m12 t1 m20 m21 m22 t2]`, the
/// layout used by BDV `<affine>` elements.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AffineTransform3D([f64; 12]);

impl AffineTransform3D {
    pub const fn identity() -> Self {
        Self([
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0,
        ])
    }

    /// Build from exactly 12 coefficients; any other count is `None`.
    pub fn from_slice(coefficients: &[f64]) -> Option<Self> {
        let array: [f64; 12] = coefficients.try_into().ok()?;
        Some(Self(array))
    }

    /// Axis-aligned scaling followed by a translation.
    pub fn scale_translate(scale: [f64; 3], translation: [f64; 3]) -> Self {
        Self([
            scale[0], 0.0, 0.0, translation[0], //
            0.0, scale[1], 0.0, translation[1], //
            0.0, 0.0, scale[2], translation[2],
        ])
    }

    pub fn coefficients(&self) -> &[f64; 12] {
        &self.0
    }

    /// Apply to a point.
    pub fn apply(&self, point: [f64; 3]) -> [f64; 3] {
        let m = &self.0;
        let mut out = [0.0; 3];
        for (row, value) in out.iter_mut().enumerate() {
            let r = row * 4;
            *value = m[r] * point[0] + m[r + 1] * point[1] + m[r + 2] * point[2] + m[r + 3];
        }
        out
    }
}

impl Default for AffineTransform3D {
    fn default() -> Self {
        Self::identity()
    }
}

/// Placement of one view in the common physical space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewRegistration {
    pub view: ViewId,
    pub transform: AffineTransform3D,
}

impl ViewRegistration {
    pub fn new(timepoint: u32, setup: u32, transform: AffineTransform3D) -> Self {
        Self {
            view: ViewId::new(timepoint, setup),
            transform,
        }
    }
}

/// Registrations indexed by view, at most one per view.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewRegistrations(BTreeMap<ViewId, ViewRegistration>);

impl ViewRegistrations {
    /// Index registrations, checking each against `shell`.
    ///
    /// A registration naming an unknown timepoint or setup is a
    /// [`DescriptorError::Malformed`]. When a view is registered twice the
    /// first registration wins.
    pub fn validated(
        shell: &SequenceShell,
        registrations: impl IntoIterator<Item = ViewRegistration>,
    ) -> Result<Self, DescriptorError> {
        let mut map = BTreeMap::new();
        for registration in registrations {
            let view = registration.view;
            if !shell.timepoints.contains_key(&view.timepoint) {
                return Err(DescriptorError::malformed(format!(
                    "registration references unknown timepoint {}",
                    view.timepoint
                )));
            }
            if !shell.setups.contains_key(&view.setup) {
                return Err(DescriptorError::malformed(format!(
                    "registration references unknown setup {}",
                    view.setup
                )));
            }
            match map.entry(view) {
                Entry::Vacant(slot) => {
                    slot.insert(registration);
                }
                Entry::Occupied(_) => {
                    debug!(
                        timepoint = view.timepoint,
                        setup = view.setup,
                        "Ignoring additional registration for view"
                    );
                }
            }
        }
        Ok(Self(map))
    }

    pub fn get(&self, view: ViewId) -> Option<&ViewRegistration> {
        self.0.get(&view)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ViewRegistration> {
        self.0.values()
    }
}

impl Serialize for ViewRegistrations {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.values())
    }
}

// =============================================================================
// Sequence description
// =============================================================================

/// Everything a sequence description holds except its image loader.
///
/// Parsers produce shells; a [`SequenceDescription`] is only formed once a
/// backend has been resolved for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SequenceShell {
    pub timepoints: BTreeMap<u32, TimePoint>,
    pub setups: BTreeMap<u32, ViewSetup>,
    pub channels: BTreeMap<u32, Channel>,
    pub angles: BTreeMap<u32, Angle>,
    pub illuminations: BTreeMap<u32, Illumination>,
}

impl SequenceShell {
    /// Timepoints `0..count`.
    pub fn with_timepoint_range(count: u32) -> Self {
        Self {
            timepoints: (0..count).map(|id| (id, TimePoint { id })).collect(),
            ..Self::default()
        }
    }

    /// Insert a setup and make sure its classification entities exist.
    pub fn insert_setup(&mut self, setup: ViewSetup) {
        self.channels
            .entry(setup.channel)
            .or_insert_with(|| Channel::new(setup.channel));
        self.angles
            .entry(setup.angle)
            .or_insert_with(|| Angle::new(setup.angle));
        self.illuminations
            .entry(setup.illumination)
            .or_insert_with(|| Illumination::new(setup.illumination));
        self.setups.insert(setup.id, setup);
    }

    /// Add channels whose ids are not present yet; existing channels are kept.
    pub fn merge_channels<I>(&mut self, channels: I)
    where
        I: IntoIterator<Item = (u32, Channel)>,
    {
        for (id, channel) in channels {
            self.channels.entry(id).or_insert(channel);
        }
    }
}

/// Timepoints, setups and the one image loader serving their pixels.
#[derive(Debug, Clone, Serialize)]
pub struct SequenceDescription {
    #[serde(flatten)]
    shell: SequenceShell,
    image_loader: ImageLoader,
}

impl SequenceDescription {
    pub fn new(shell: SequenceShell, image_loader: ImageLoader) -> Self {
        Self {
            shell,
            image_loader,
        }
    }

    pub fn timepoints(&self) -> &BTreeMap<u32, TimePoint> {
        &self.shell.timepoints
    }

    pub fn setups(&self) -> &BTreeMap<u32, ViewSetup> {
        &self.shell.setups
    }

    pub fn channels(&self) -> &BTreeMap<u32, Channel> {
        &self.shell.channels
    }

    pub fn angles(&self) -> &BTreeMap<u32, Angle> {
        &self.shell.angles
    }

    pub fn illuminations(&self) -> &BTreeMap<u32, Illumination> {
        &self.shell.illuminations
    }

    pub fn shell(&self) -> &SequenceShell {
        &self.shell
    }

    pub fn image_loader(&self) -> &ImageLoader {
        &self.image_loader
    }

    pub fn into_parts(self) -> (SequenceShell, ImageLoader) {
        (self.shell, self.image_loader)
    }
}

// =============================================================================
// Dataset
// =============================================================================

/// A fully resolved dataset.
#[derive(Debug, Clone, Serialize)]
pub struct Dataset {
    base_path: Option<Location>,
    sequence: SequenceDescription,
    registrations: ViewRegistrations,
}

impl Dataset {
    /// Assemble a dataset, checking registrations against the sequence.
    pub fn new(
        base_path: Option<Location>,
        sequence: SequenceDescription,
        registrations: impl IntoIterator<Item = ViewRegistration>,
    ) -> Result<Self, DescriptorError> {
        let registrations = ViewRegistrations::validated(sequence.shell(), registrations)?;
        Ok(Self {
            base_path,
            sequence,
            registrations,
        })
    }

    /// Assemble from registrations that were already validated against `sequence`.
    pub(crate) fn from_validated(
        base_path: Option<Location>,
        sequence: SequenceDescription,
        registrations: ViewRegistrations,
    ) -> Self {
        Self {
            base_path,
            sequence,
            registrations,
        }
    }

    pub fn base_path(&self) -> Option<&Location> {
        self.base_path.as_ref()
    }

    pub fn sequence(&self) -> &SequenceDescription {
        &self.sequence
    }

    pub fn registrations(&self) -> &ViewRegistrations {
        &self.registrations
    }

    pub fn image_loader(&self) -> &ImageLoader {
        self.sequence.image_loader()
    }

    pub fn into_parts(self) -> (Option<Location>, SequenceDescription, ViewRegistrations) {
        (self.base_path, self.sequence, self.registrations)
    }
}
