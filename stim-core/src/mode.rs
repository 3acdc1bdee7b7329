//! Operating modes selected by the network governor.

use core::fmt;

/// Device operating mode. Raw codes follow the network numbering.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperatingMode {
    Hibernate,
    Waiting,
    XManual,
    YManual,
    Stopped,
    PatientControl,
    PatientManual,
    ProduceXManual,
    RecordX,
}

/// Where the setpoint dispatch takes each channel's next pulse from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SetpointSource {
    /// No stimulation. `clear_direct` also zeroes the direct setpoints.
    Off { clear_direct: bool },
    /// Pattern interpolation driven by the channel's x index.
    Interpolated,
    /// The channel's direct (width, amplitude) setpoint.
    Direct,
}

impl OperatingMode {
    /// Every mode, in raw-code order.
    pub const ALL: [OperatingMode; 9] = [
        OperatingMode::Hibernate,
        OperatingMode::Waiting,
        OperatingMode::XManual,
        OperatingMode::YManual,
        OperatingMode::Stopped,
        OperatingMode::PatientControl,
        OperatingMode::PatientManual,
        OperatingMode::ProduceXManual,
        OperatingMode::RecordX,
    ];

    /// Encodes the mode into its network code.
    pub const fn to_raw(self) -> u8 {
        match self {
            OperatingMode::Hibernate => 0x00,
            OperatingMode::Waiting => 0x01,
            OperatingMode::XManual => 0x02,
            OperatingMode::YManual => 0x03,
            OperatingMode::Stopped => 0x04,
            OperatingMode::PatientControl => 0x05,
            OperatingMode::PatientManual => 0x07,
            OperatingMode::ProduceXManual => 0x08,
            OperatingMode::RecordX => 0x09,
        }
    }

    /// Decodes a network code. Unknown codes yield `None`.
    pub const fn from_raw(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(OperatingMode::Hibernate),
            0x01 => Some(OperatingMode::Waiting),
            0x02 => Some(OperatingMode::XManual),
            0x03 => Some(OperatingMode::YManual),
            0x04 => Some(OperatingMode::Stopped),
            0x05 => Some(OperatingMode::PatientControl),
            0x07 => Some(OperatingMode::PatientManual),
            0x08 => Some(OperatingMode::ProduceXManual),
            0x09 => Some(OperatingMode::RecordX),
            _ => None,
        }
    }

    /// Selects the setpoint source for the dispatch task.
    pub const fn setpoint_source(self) -> SetpointSource {
        match self {
            OperatingMode::Stopped => SetpointSource::Off {
                clear_direct: false,
            },
            OperatingMode::Hibernate | OperatingMode::Waiting => SetpointSource::Off {
                clear_direct: true,
            },
            OperatingMode::PatientControl
            | OperatingMode::PatientManual
            | OperatingMode::XManual => SetpointSource::Interpolated,
            OperatingMode::ProduceXManual | OperatingMode::YManual | OperatingMode::RecordX => {
                SetpointSource::Direct
            }
        }
    }

    /// Returns `true` for modes that deliver pulses.
    pub const fn is_stimulating(self) -> bool {
        !matches!(
            self,
            OperatingMode::Hibernate | OperatingMode::Waiting | OperatingMode::Stopped
        )
    }

    /// Returns `true` when the supply should be de-energized once discharge completes.
    pub const fn is_idle(self) -> bool {
        !self.is_stimulating()
    }

    /// Returns `true` when the scheduler may synthesize its own sync events.
    pub const fn allows_autonomous_sync(self) -> bool {
        matches!(self, OperatingMode::PatientControl)
    }

    /// Returns `true` when entering the mode activates a pattern function group.
    pub const fn uses_patterns(self) -> bool {
        matches!(self.setpoint_source(), SetpointSource::Interpolated)
    }

    /// Short lowercase label used by the console and logs.
    pub const fn label(self) -> &'static str {
        match self {
            OperatingMode::Hibernate => "hibernate",
            OperatingMode::Waiting => "waiting",
            OperatingMode::XManual => "x-manual",
            OperatingMode::YManual => "y-manual",
            OperatingMode::Stopped => "stopped",
            OperatingMode::PatientControl => "patient-control",
            OperatingMode::PatientManual => "patient-manual",
            OperatingMode::ProduceXManual => "produce-x-manual",
            OperatingMode::RecordX => "record-x",
        }
    }

    /// Looks a mode up by its [`label`](Self::label), ignoring ASCII case.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|mode| mode.label().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_codes_round_trip_and_skip_six() {
        for mode in OperatingMode::ALL {
            assert_eq!(OperatingMode::from_raw(mode.to_raw()), Some(mode));
        }
        assert_eq!(OperatingMode::from_raw(0x06), None);
        assert_eq!(OperatingMode::from_raw(0x0A), None);
    }

    #[test]
    fn only_waiting_clears_direct_setpoints_among_idle_modes() {
        assert_eq!(
            OperatingMode::Waiting.setpoint_source(),
            SetpointSource::Off { clear_direct: true }
        );
        assert_eq!(
            OperatingMode::Stopped.setpoint_source(),
            SetpointSource::Off {
                clear_direct: false
            }
        );
    }

    #[test]
    fn autonomous_sync_limited_to_patient_control() {
        let allowed: usize = OperatingMode::ALL
            .iter()
            .filter(|mode| mode.allows_autonomous_sync())
            .count();
        assert_eq!(allowed, 1);
        assert!(OperatingMode::PatientControl.allows_autonomous_sync());
    }

    #[test]
    fn labels_parse_case_insensitively() {
        assert_eq!(
            OperatingMode::from_label("Patient-Control"),
            Some(OperatingMode::PatientControl)
        );
        assert_eq!(OperatingMode::from_label("bogus"), None);
    }
}
