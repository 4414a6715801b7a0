//! Parameter registry.
//!
//! Parameters are registered while a program is being built, then shared
//! (behind an `Arc`) between the control thread, which writes values, and
//! the audio thread, which copies them into a `ParamSnapshot` once per
//! block. Each value lives in its own `AtomicU32` holding the `f32` bits,
//! so a read can never observe a half-written value and neither side ever
//! waits on the other.
//!
//! Parameters are addressable by their string id (a Faust-style path such
//! as `/synth/osc/freq`) or by their index in registration order.

use rtdsp_core::{Error, Result, Sample};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};

/// Control widget a host should use to render a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Widget {
    #[default]
    HSlider,
    VSlider,
    #[serde(rename = "nentry")]
    NumEntry,
    Button,
    Checkbox,
}

/// Static description of a parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDescriptor {
    /// Stable identifier (address)
    pub id: String,
    /// Human-readable label
    pub label: String,
    pub min: f32,
    pub max: f32,
    pub default: f32,
    /// Suggested UI step (0.0 = continuous)
    pub step: f32,
    pub widget: Widget,
    /// Grouping for UI layout (usually the owning node)
    pub group: String,
    pub unit: Option<String>,
}

impl ParamDescriptor {
    /// Continuous slider parameter labelled with its id.
    pub fn new(id: impl Into<String>, min: f32, max: f32, default: f32) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            min,
            max,
            default,
            step: 0.0,
            widget: Widget::HSlider,
            group: String::new(),
            unit: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_step(mut self, step: f32) -> Self {
        self.step = step;
        self
    }

    pub fn with_widget(mut self, widget: Widget) -> Self {
        self.widget = widget;
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Clamp a value into `[min, max]`.
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    fn validate(&self) -> Result<()> {
        // Written as negations so NaN bounds are rejected too
        let ordered = self.min <= self.max;
        let default_in_range = self.min <= self.default && self.default <= self.max;
        if ordered && default_in_range {
            Ok(())
        } else {
            Err(Error::InvalidRange {
                id: self.id.clone(),
                min: self.min,
                max: self.max,
                default: self.default,
            })
        }
    }
}

/// Index of a registered parameter; valid for the registry that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamHandle(pub usize);

impl ParamHandle {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Either addressing mode accepted by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKey<'a> {
    Id(&'a str),
    Index(usize),
}

impl<'a> From<&'a str> for ParamKey<'a> {
    fn from(id: &'a str) -> Self {
        Self::Id(id)
    }
}

impl<'a> From<&'a String> for ParamKey<'a> {
    fn from(id: &'a String) -> Self {
        Self::Id(id)
    }
}

impl From<usize> for ParamKey<'_> {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<ParamHandle> for ParamKey<'_> {
    fn from(handle: ParamHandle) -> Self {
        Self::Index(handle.0)
    }
}

impl fmt::Display for ParamKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => f.write_str(id),
            Self::Index(index) => write!(f, "#{index}"),
        }
    }
}

struct ParamSlot {
    descriptor: ParamDescriptor,
    /// Current value as f32 bits
    value: AtomicU32,
}

impl ParamSlot {
    #[inline]
    fn load(&self) -> f32 {
        f32::from_bits(self.value.load(Ordering::Acquire))
    }

    #[inline]
    fn store(&self, value: f32) {
        self.value.store(value.to_bits(), Ordering::Release);
    }
}

/// The set of named, addressable control parameters of one program.
///
/// Registration needs `&mut self`; reading and writing values only `&self`,
/// so a built registry can be shared across threads.
#[derive(Default)]
pub struct ParamRegistry {
    slots: Vec<ParamSlot>,
    index: HashMap<String, usize>,
}

impl ParamRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a continuous parameter.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        min: f32,
        max: f32,
        default: f32,
    ) -> Result<ParamHandle> {
        self.register_descriptor(ParamDescriptor::new(id, min, max, default))
    }

    /// Register a parameter from a full descriptor.
    pub fn register_descriptor(&mut self, descriptor: ParamDescriptor) -> Result<ParamHandle> {
        if self.index.contains_key(&descriptor.id) {
            return Err(Error::DuplicateId(descriptor.id));
        }
        descriptor.validate()?;

        let handle = ParamHandle(self.slots.len());
        self.index.insert(descriptor.id.clone(), handle.0);
        self.slots.push(ParamSlot {
            value: AtomicU32::new(descriptor.default.to_bits()),
            descriptor,
        });
        Ok(handle)
    }

    /// Look up the handle for an id.
    pub fn lookup(&self, id: &str) -> Option<ParamHandle> {
        self.index.get(id).copied().map(ParamHandle)
    }

    fn slot<'k>(&self, key: impl Into<ParamKey<'k>>) -> Result<&ParamSlot> {
        let key = key.into();
        let slot = match key {
            ParamKey::Id(id) => self.index.get(id).and_then(|&i| self.slots.get(i)),
            ParamKey::Index(i) => self.slots.get(i),
        };
        slot.ok_or_else(|| Error::UnknownParameter(key.to_string()))
    }

    /// Set a value, clamped into the parameter's range.
    ///
    /// Out-of-range input is not an error. NaN leaves the value unchanged.
    pub fn set_value<'k>(&self, key: impl Into<ParamKey<'k>>, value: f32) -> Result<()> {
        let slot = self.slot(key)?;
        if !value.is_nan() {
            slot.store(slot.descriptor.clamp(value));
        }
        Ok(())
    }

    /// Current value of a parameter.
    pub fn get_value<'k>(&self, key: impl Into<ParamKey<'k>>) -> Result<f32> {
        self.slot(key).map(ParamSlot::load)
    }

    /// Put a parameter back to its default value.
    pub fn reset<'k>(&self, key: impl Into<ParamKey<'k>>) -> Result<()> {
        let slot = self.slot(key)?;
        slot.store(slot.descriptor.default);
        Ok(())
    }

    /// Put every parameter back to its default value.
    pub fn reset_all(&self) {
        for slot in &self.slots {
            slot.store(slot.descriptor.default);
        }
    }

    /// Descriptor of a single parameter.
    pub fn descriptor<'k>(&self, key: impl Into<ParamKey<'k>>) -> Result<&ParamDescriptor> {
        self.slot(key).map(|slot| &slot.descriptor)
    }

    /// Descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ParamDescriptor> {
        self.slots.iter().map(|slot| &slot.descriptor)
    }

    /// Owned copy of all descriptors in registration order.
    pub fn list(&self) -> Vec<ParamDescriptor> {
        self.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Allocate a snapshot sized for this registry.
    pub fn snapshot(&self) -> ParamSnapshot {
        let mut snapshot = ParamSnapshot {
            values: vec![0.0; self.slots.len()],
        };
        self.snapshot_into(&mut snapshot);
        snapshot
    }

    /// Copy every current value into `snapshot` without allocating.
    ///
    /// Real-time safe. Only the overlapping prefix is copied if the
    /// snapshot was sized for a different registry.
    pub fn snapshot_into(&self, snapshot: &mut ParamSnapshot) {
        for (dst, slot) in snapshot.values.iter_mut().zip(&self.slots) {
            *dst = slot.load();
        }
    }
}

impl fmt::Debug for ParamRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.slots.iter().map(|s| (&s.descriptor.id, s.load())))
            .finish()
    }
}

/// Parameter values frozen for the duration of one block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSnapshot {
    values: Vec<Sample>,
}

impl ParamSnapshot {
    pub fn values(&self) -> &[Sample] {
        &self.values
    }

    pub fn get(&self, handle: ParamHandle) -> Option<Sample> {
        self.values.get(handle.0).copied()
    }

    /// Sub-slice for a contiguous run of parameters (empty if out of bounds).
    pub fn range(&self, range: Range<usize>) -> &[Sample] {
        self.values.get(range).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
