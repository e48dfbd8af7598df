//! Atlas Scientific EZO probe and pump boards over I²C.
//!
//! EZO circuits answer ASCII commands: write the command bytes, wait the
//! documented processing time, then read a status byte followed by the
//! reply text. `R` on a probe returns the current value; `D,<ml>` on an
//! EZO-PMP dispenses a volume and self-terminates, which keeps a hung
//! caller from over-running the pump.

use std::thread;
use std::time::Duration;

use rppal::i2c::I2c;
use tracing::trace;

use crate::error::{HwError, Result};
use hydro_traits::{PumpActuator, PumpRole, PumpStatus, SensorReading, SensorSource};

/// Default EZO addresses (factory settings).
pub const ADDR_PH: u16 = 0x63;
pub const ADDR_EC: u16 = 0x64;
pub const ADDR_RTD: u16 = 0x66;
pub const ADDR_PUMP_PH_UP: u16 = 0x67;
pub const ADDR_PUMP_PH_DOWN: u16 = 0x68;
pub const ADDR_PUMP_NUTRIENT: u16 = 0x69;

/// Documented processing time for a probe reading.
const READ_DELAY: Duration = Duration::from_millis(900);
/// Short commands (dispense, status) settle faster.
const SHORT_DELAY: Duration = Duration::from_millis(300);

const STATUS_OK: u8 = 1;
const STATUS_PENDING: u8 = 254;

fn exchange(bus: &mut I2c, addr: u16, command: &str, delay: Duration) -> Result<String> {
    bus.set_slave_address(addr)
        .map_err(|e| HwError::Bus(e.to_string()))?;
    bus.write(command.as_bytes())
        .map_err(|e| HwError::Bus(e.to_string()))?;
    thread::sleep(delay);

    let mut buf = [0u8; 32];
    // The circuit reports 254 while still processing; give it a few tries.
    for _ in 0..3 {
        bus.read(&mut buf).map_err(|e| HwError::Bus(e.to_string()))?;
        match buf[0] {
            STATUS_OK => {
                let text: Vec<u8> = buf[1..]
                    .iter()
                    .copied()
                    .take_while(|&b| b != 0)
                    .collect();
                let reply = String::from_utf8(text)
                    .map_err(|e| HwError::BadReply(e.to_string()))?;
                trace!(addr, command, reply = reply.as_str(), "ezo exchange");
                return Ok(reply);
            }
            STATUS_PENDING => thread::sleep(SHORT_DELAY),
            other => {
                return Err(HwError::BadReply(format!(
                    "status byte {other} from 0x{addr:02x}"
                )));
            }
        }
    }
    Err(HwError::Timeout)
}

fn parse_value(reply: &str) -> Result<f64> {
    reply
        .trim()
        .split(',')
        .next()
        .unwrap_or_default()
        .parse::<f64>()
        .map_err(|_| HwError::BadReply(reply.to_string()))
}

/// pH/EC/temperature probe trio on one I²C bus.
pub struct EzoSensors {
    bus: I2c,
    reads: u64,
}

impl EzoSensors {
    pub fn new() -> Result<Self> {
        let bus = I2c::new().map_err(|e| HwError::Bus(e.to_string()))?;
        Ok(Self { bus, reads: 0 })
    }

    fn read_value(&mut self, addr: u16) -> Result<f64> {
        let reply = exchange(&mut self.bus, addr, "R", READ_DELAY)?;
        parse_value(&reply)
    }
}

impl SensorSource for EzoSensors {
    fn read(&mut self) -> std::result::Result<SensorReading, Box<dyn std::error::Error + Send + Sync>> {
        let ph = self.read_value(ADDR_PH)?;
        let ec = self.read_value(ADDR_EC)?;
        let water_temp_c = self.read_value(ADDR_RTD)?;
        self.reads += 1;
        Ok(SensorReading {
            ph,
            // EZO EC reports microsiemens; the engine works in mS/cm.
            ec: ec / 1000.0,
            water_temp_c,
            timestamp_ms: self.reads,
        })
    }
}

/// Bank of EZO-PMP peristaltic pumps.
pub struct EzoPumps {
    bus: I2c,
}

impl EzoPumps {
    pub fn new() -> Result<Self> {
        let bus = I2c::new().map_err(|e| HwError::Bus(e.to_string()))?;
        Ok(Self { bus })
    }

    fn address(pump: PumpRole) -> u16 {
        match pump {
            PumpRole::PhUp => ADDR_PUMP_PH_UP,
            PumpRole::PhDown => ADDR_PUMP_PH_DOWN,
            PumpRole::Nutrient => ADDR_PUMP_NUTRIENT,
        }
    }
}

impl PumpActuator for EzoPumps {
    fn dispense(
        &mut self,
        pump: PumpRole,
        volume_ml: f64,
        _flow_rate_ml_s: f64,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // The EZO-PMP meters the volume itself; flow rate is a board
        // calibration, not a per-command parameter.
        let command = format!("D,{volume_ml:.2}");
        exchange(&mut self.bus, Self::address(pump), &command, SHORT_DELAY)?;
        Ok(())
    }

    fn status(&self, pump: PumpRole) -> PumpStatus {
        // `D,?` replies with `?D,<ml>,<1|0>`; the trailing flag is
        // 1 while the pump is still dispensing.
        let mut bus = match I2c::new() {
            Ok(b) => b,
            Err(_) => return PumpStatus { active: false },
        };
        match exchange(&mut bus, Self::address(pump), "D,?", SHORT_DELAY) {
            Ok(reply) => PumpStatus {
                active: reply.trim_end().ends_with(",1"),
            },
            Err(_) => PumpStatus { active: false },
        }
    }
}
