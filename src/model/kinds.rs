use serde::{Deserialize, Serialize};

/// Aircraft kind, wire-identical to the FANET header flag values (0-7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AircraftKind {
    Unknown = 0,
    Paraglider = 1,
    HangGlider = 2,
    Balloon = 3,
    Glider = 4,
    Powered = 5,
    Helicopter = 6,
    Uav = 7,
}

impl AircraftKind {
    pub fn from_wire(value: u8) -> Self {
        match value {
            1 => Self::Paraglider,
            2 => Self::HangGlider,
            3 => Self::Balloon,
            4 => Self::Glider,
            5 => Self::Powered,
            6 => Self::Helicopter,
            7 => Self::Uav,
            _ => Self::Unknown,
        }
    }

    /// Max plausible ground speed in km/h, before the validator's
    /// `speed-multiplier` is applied (§4.2).
    pub fn max_speed_kmh(self) -> f64 {
        match self {
            Self::Unknown => 150.0,
            Self::Paraglider => 80.0,
            Self::HangGlider => 120.0,
            Self::Balloon => 50.0,
            Self::Glider => 200.0,
            Self::Powered => 300.0,
            Self::Helicopter => 250.0,
            Self::Uav => 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroundKind {
    Walking,
    Vehicle,
    Bike,
    Boot,
    NeedRide,
    LandedWell,
    NeedTechnicalSupport,
    NeedMedicalHelp,
    DistressCall,
    DistressAuto,
    Other,
}

impl GroundKind {
    pub fn from_wire(value: u8) -> Self {
        match value {
            0 => Self::Walking,
            1 => Self::Vehicle,
            2 => Self::Bike,
            3 => Self::Boot,
            4 => Self::NeedRide,
            5 => Self::LandedWell,
            6 => Self::NeedTechnicalSupport,
            7 => Self::NeedMedicalHelp,
            8 => Self::DistressCall,
            9 => Self::DistressAuto,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Visibility {
    Visible,
    Boundary,
    Outside,
}
