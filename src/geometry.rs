//! Static device geometry and orientation, established once at `open`
//! via the config channel and held for the lifetime of the
//! decoder.

/// Chip identifiers the DAVIS common core distinguishes behavior on.
/// Only [`ChipId::Davis208`] (inverted high-gain-row polarity) and
/// [`ChipId::DavisRgb`] (reset/signal ordering, RGB sub-pixel offset
/// walk) gate decoder behavior; the remaining variants are carried
/// through for `info_get` to report faithfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChipId {
    Davis240A,
    Davis240B,
    Davis240C,
    Davis128,
    Davis208,
    Davis346A,
    Davis346B,
    Davis346Cbsi,
    Davis640,
    DavisRgb,
    Davis346Aba,
}

/// Orientation flags applied by the decoder when assembling pixel
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Orientation {
    pub dvs_invert_xy: bool,
    pub aps_invert_xy: bool,
    pub aps_flip_x: bool,
    pub aps_flip_y: bool,
}

/// Static sensor geometry, probed once at `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Geometry {
    pub dvs_w: u16,
    pub dvs_h: u16,
    pub aps_w: u16,
    pub aps_h: u16,
    /// 1 (mono) or 4 (RGBA) color channels, from the sensor's color
    /// filter.
    pub channels: u8,
    pub chip_id: ChipId,
    pub orientation: Orientation,
    /// Origin, within the full sensor array, of the APS readout
    /// window (non-zero when a sub-window ROI is configured).
    pub aps_window0_x: u16,
    pub aps_window0_y: u16,
    /// Size of the APS readout window; may be smaller than
    /// `(aps_w, aps_h)` when a sub-window ROI is configured. Each
    /// frame is allocated at this size.
    pub aps_window0_w: u16,
    pub aps_window0_h: u16,
}

impl Geometry {
    /// Sensor-wide pixel count used to size the reset-read scratch
    /// buffer: `sensor_w * sensor_h * channels`.
    pub fn reset_scratch_len(&self) -> usize {
        self.aps_w as usize * self.aps_h as usize * self.channels as usize
    }

    /// Index into the reset-read scratch buffer for an absolute pixel
    /// position within the full sensor array.
    pub(crate) fn reset_scratch_index(&self, x_abs: u16, y_abs: u16) -> usize {
        y_abs as usize * self.aps_w as usize + x_abs as usize
    }
}
