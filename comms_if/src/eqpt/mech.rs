//! # Mechanisms Equipment Commands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Serialize, Deserialize};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Drive actuators in the order they appear in the speed vector.
pub const DRV_IDS: [ActId; 4] = [
    ActId::DrvFL,
    ActId::DrvFR,
    ActId::DrvRL,
    ActId::DrvRR
];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Demands that are sent to the drive motors.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct MechDems {
    /// Normalised speed of each drive wheel in [-1, 1], ordered `[FL, FR, RL, RR]`.
    pub drv_speed: [f64; 4]
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// IDs of all actuators available to the robot
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Copy, Clone)]
pub enum ActId {
    DrvFL,
    DrvFR,
    DrvRL,
    DrvRR
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl MechDems {
    /// Demands which hold every motor stationary.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.drv_speed.iter().all(|s| *s == 0.0)
    }

    /// Get the speed demanded of a single actuator.
    pub fn speed(&self, id: ActId) -> f64 {
        match id {
            ActId::DrvFL => self.drv_speed[0],
            ActId::DrvFR => self.drv_speed[1],
            ActId::DrvRL => self.drv_speed[2],
            ActId::DrvRR => self.drv_speed[3]
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_speed_lookup() {
        let dems = MechDems { drv_speed: [0.1, 0.2, 0.3, 0.4] };

        let speeds: Vec<f64> = DRV_IDS.iter().map(|id| dems.speed(*id)).collect();

        assert_eq!(speeds, vec![0.1, 0.2, 0.3, 0.4]);
        assert!(!dems.is_zero());
        assert!(MechDems::zero().is_zero());
    }
}
