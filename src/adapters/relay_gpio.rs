//! Relay outputs over three `embedded-hal` GPIO pins.
//!
//! The bank is generic over [`OutputPin`] so the ESP-IDF `PinDriver`s and
//! host test doubles drive the same code. Relay boards come in both
//! polarities; `active_high = false` inverts every write.

use embedded_hal::digital::OutputPin;
use log::{info, warn};

use crate::app::ports::RelayPort;
use crate::error::ActuatorError;

/// Charge, motor and fan relay drivers.
pub struct GpioRelayBank<C, M, F> {
    charge: C,
    motor: M,
    fan: F,
    active_high: bool,
}

impl<C, M, F> GpioRelayBank<C, M, F>
where
    C: OutputPin,
    M: OutputPin,
    F: OutputPin,
{
    pub fn new(charge: C, motor: M, fan: F, active_high: bool) -> Self {
        info!(
            "GpioRelayBank: ready ({})",
            if active_high { "active-high" } else { "active-low" }
        );
        Self {
            charge,
            motor,
            fan,
            active_high,
        }
    }

    /// Release the pins (used by tests to inspect the doubles).
    pub fn into_inner(self) -> (C, M, F) {
        (self.charge, self.motor, self.fan)
    }
}

fn drive<P: OutputPin>(pin: &mut P, on: bool, active_high: bool, name: &str) -> Result<(), ActuatorError> {
    let result = if on == active_high {
        pin.set_high()
    } else {
        pin.set_low()
    };
    result.map_err(|e| {
        warn!("GpioRelayBank: {} relay write failed: {:?}", name, e);
        ActuatorError::GpioWriteFailed
    })
}

impl<C, M, F> RelayPort for GpioRelayBank<C, M, F>
where
    C: OutputPin,
    M: OutputPin,
    F: OutputPin,
{
    fn set_charge(&mut self, on: bool) -> Result<(), ActuatorError> {
        drive(&mut self.charge, on, self.active_high, "charge")
    }

    fn set_motor(&mut self, on: bool) -> Result<(), ActuatorError> {
        drive(&mut self.motor, on, self.active_high, "motor")
    }

    fn set_fan(&mut self, on: bool) -> Result<(), ActuatorError> {
        drive(&mut self.fan, on, self.active_high, "fan")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use embedded_hal::digital::{ErrorKind, ErrorType};

    #[derive(Default)]
    struct FakePin {
        high: Option<bool>,
    }

    impl ErrorType for FakePin {
        type Error = Infallible;
    }

    impl OutputPin for FakePin {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.high = Some(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.high = Some(true);
            Ok(())
        }
    }

    struct BrokenPin;

    impl ErrorType for BrokenPin {
        type Error = ErrorKind;
    }

    impl OutputPin for BrokenPin {
        fn set_low(&mut self) -> Result<(), ErrorKind> {
            Err(ErrorKind::Other)
        }

        fn set_high(&mut self) -> Result<(), ErrorKind> {
            Err(ErrorKind::Other)
        }
    }

    #[test]
    fn active_high_follows_command() {
        let mut bank = GpioRelayBank::new(FakePin::default(), FakePin::default(), FakePin::default(), true);
        bank.set_charge(true).unwrap();
        bank.set_motor(false).unwrap();
        let (charge, motor, fan) = bank.into_inner();
        assert_eq!(charge.high, Some(true));
        assert_eq!(motor.high, Some(false));
        assert_eq!(fan.high, None);
    }

    #[test]
    fn active_low_inverts() {
        let mut bank = GpioRelayBank::new(FakePin::default(), FakePin::default(), FakePin::default(), false);
        bank.set_fan(true).unwrap();
        bank.set_motor(false).unwrap();
        let (_, motor, fan) = bank.into_inner();
        assert_eq!(fan.high, Some(false));
        assert_eq!(motor.high, Some(true));
    }

    #[test]
    fn pin_error_maps_to_actuator_error() {
        let mut bank = GpioRelayBank::new(FakePin::default(), BrokenPin, FakePin::default(), true);
        assert_eq!(bank.set_motor(true), Err(ActuatorError::GpioWriteFailed));
        assert!(bank.set_charge(true).is_ok());
    }
}
