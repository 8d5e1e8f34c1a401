//! Keithley 2182A nanovoltmeter driver.
//!
//! SCPI command set from the 2182A manual. The instrument measures voltage
//! from the nanovolt range up to 100 V and, with a thermocouple, temperature.
//! The driver is a thin typed layer over [`ScpiTransport`]: every parameter
//! accessor formats one command and parses one reply, with validation bounds
//! matching the instrument's accepted ranges.

use anyhow::Result;
use async_trait::async_trait;
use log::info;

use crate::error::{TransmeasError, TransmeasResult};
use crate::hardware::capabilities::Voltmeter;
use crate::instrument::scpi::{self, ScpiTransport};

/// What the sense function is measuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementMode {
    /// DC voltage on the selected channel.
    Voltage,
    /// Thermocouple temperature.
    Temperature,
}

impl MeasurementMode {
    fn command_value(&self) -> &'static str {
        match self {
            MeasurementMode::Voltage => "\"VOLT:DC\"",
            MeasurementMode::Temperature => "TEMP",
        }
    }
}

/// Driver for the Keithley 2182A nanovoltmeter.
pub struct Keithley2182a {
    id: String,
    transport: Box<dyn ScpiTransport>,
}

impl Keithley2182a {
    /// Create a driver over an open transport session.
    pub fn new(id: impl Into<String>, transport: Box<dyn ScpiTransport>) -> Self {
        Self {
            id: id.into(),
            transport,
        }
    }

    /// Identification string (`*IDN?`).
    pub async fn idn(&self) -> TransmeasResult<String> {
        Ok(self.transport.query("*IDN?").await?.trim().to_string())
    }

    /// Take a single reading in the current measurement mode.
    pub async fn measure(&self) -> TransmeasResult<f64> {
        let response = self.transport.query(":SENS:DATA:FRES?").await?;
        scpi::parse_f64(&self.id, &response)
    }

    /// Switch between voltage and temperature measurement.
    pub async fn set_measurement_mode(&self, mode: MeasurementMode) -> TransmeasResult<()> {
        info!("{}: measurement mode -> {mode:?}", self.id);
        self.transport
            .write(&format!(":SENS:FUNC {}", mode.command_value()))
            .await?;
        Ok(())
    }

    /// Query the active measurement mode.
    pub async fn measurement_mode(&self) -> TransmeasResult<MeasurementMode> {
        let response = self.transport.query(":SENS:FUNC?").await?;
        match response.trim().trim_matches('"') {
            "VOLT:DC" => Ok(MeasurementMode::Voltage),
            "TEMP" => Ok(MeasurementMode::Temperature),
            other => Err(TransmeasError::Instrument(format!(
                "{}: unexpected sense function '{other}'",
                self.id
            ))),
        }
    }

    /// Enable or disable voltage auto-ranging.
    pub async fn set_auto_range(&self, on: bool) -> TransmeasResult<()> {
        self.transport
            .write(&format!(":SENS:VOLT:RANG:AUTO {}", scpi::format_on_off(on)))
            .await?;
        Ok(())
    }

    /// Query the auto-range setting.
    pub async fn auto_range(&self) -> TransmeasResult<bool> {
        let response = self.transport.query(":SENS:VOLT:RANG:AUTO?").await?;
        scpi::parse_on_off(&self.id, &response)
    }

    /// Set the manual voltage range (1e-7 to 100 V).
    pub async fn set_range(&self, volts: f64) -> TransmeasResult<()> {
        if !(1e-7..=100.0).contains(&volts) {
            return Err(TransmeasError::OutOfRange {
                quantity: "voltage range",
                value: volts,
                min: 1e-7,
                max: 100.0,
            });
        }
        self.transport
            .write(&format!(":SENS:VOLT:RANG {volts}"))
            .await?;
        Ok(())
    }

    /// Query the manual voltage range (V).
    pub async fn range(&self) -> TransmeasResult<f64> {
        let response = self.transport.query(":SENS:VOLT:RANG?").await?;
        scpi::parse_f64(&self.id, &response)
    }

    /// Set the integration rate in power-line cycles (0.01 to 50).
    pub async fn set_nplc(&self, nplc: f64) -> TransmeasResult<()> {
        if !(0.01..=50.0).contains(&nplc) {
            return Err(TransmeasError::OutOfRange {
                quantity: "NPLC",
                value: nplc,
                min: 0.01,
                max: 50.0,
            });
        }
        self.transport
            .write(&format!(":SENS:VOLT:NPLC {nplc}"))
            .await?;
        Ok(())
    }

    /// Query the integration rate in power-line cycles.
    pub async fn nplc(&self) -> TransmeasResult<f64> {
        let response = self.transport.query(":SENS:VOLT:NPLC?").await?;
        scpi::parse_f64(&self.id, &response)
    }

    /// Enable or disable auto-zero.
    pub async fn set_auto_zero(&self, on: bool) -> TransmeasResult<()> {
        self.transport
            .write(&format!(":SYST:AZER {}", scpi::format_on_off(on)))
            .await?;
        Ok(())
    }

    /// Select the measurement channel (0 = internal temperature sensor,
    /// 1 or 2 = input channels).
    pub async fn set_channel(&self, channel: u8) -> TransmeasResult<()> {
        if channel > 2 {
            return Err(TransmeasError::OutOfRange {
                quantity: "measurement channel",
                value: f64::from(channel),
                min: 0.0,
                max: 2.0,
            });
        }
        self.transport
            .write(&format!(":SENS:CHAN {channel}"))
            .await?;
        Ok(())
    }

    /// Enable or disable the analog low-pass filter.
    pub async fn set_analog_filter(&self, on: bool) -> TransmeasResult<()> {
        self.transport
            .write(&format!(":SENS:VOLT:LPAS {}", scpi::format_on_off(on)))
            .await?;
        Ok(())
    }

    /// Enable or disable the digital filter.
    pub async fn set_digital_filter(&self, on: bool) -> TransmeasResult<()> {
        self.transport
            .write(&format!(":SENS:VOLT:DFIL {}", scpi::format_on_off(on)))
            .await?;
        Ok(())
    }

    /// Enable or disable the front-panel display. Disabling it shortens the
    /// measurement cycle.
    pub async fn set_display_enabled(&self, on: bool) -> TransmeasResult<()> {
        self.transport
            .write(&format!(":DISP:ENAB {}", scpi::format_on_off(on)))
            .await?;
        Ok(())
    }

    /// Clear all event registers and the error queue (`*CLS`).
    pub async fn clear(&self) -> TransmeasResult<()> {
        self.transport.write("*CLS").await?;
        Ok(())
    }

    /// Return the instrument to its `*RST` default conditions.
    pub async fn reset(&self) -> TransmeasResult<()> {
        self.transport.write("*RST").await?;
        Ok(())
    }
}

#[async_trait]
impl Voltmeter for Keithley2182a {
    async fn read_voltage(&self) -> Result<f64> {
        self.measure().await.map_err(anyhow::Error::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    /// Transport that checks commands against a script and replays canned
    /// responses.
    struct ScriptedTransport {
        script: Mutex<VecDeque<(String, Option<String>)>>,
    }

    impl ScriptedTransport {
        fn new(steps: &[(&str, Option<&str>)]) -> Self {
            Self {
                script: Mutex::new(
                    steps
                        .iter()
                        .map(|(cmd, resp)| (cmd.to_string(), resp.map(str::to_string)))
                        .collect(),
                ),
            }
        }
    }

    #[async_trait]
    impl ScpiTransport for ScriptedTransport {
        async fn write(&self, command: &str) -> Result<()> {
            let mut script = self.script.lock().await;
            match script.pop_front() {
                Some((expected, None)) if expected == command => Ok(()),
                Some((expected, _)) => bail!("expected '{expected}', driver sent '{command}'"),
                None => bail!("unexpected command '{command}'"),
            }
        }

        async fn query(&self, command: &str) -> Result<String> {
            let mut script = self.script.lock().await;
            match script.pop_front() {
                Some((expected, Some(response))) if expected == command => Ok(response),
                Some((expected, _)) => bail!("expected '{expected}', driver sent '{command}'"),
                None => bail!("unexpected query '{command}'"),
            }
        }
    }

    fn driver(steps: &[(&str, Option<&str>)]) -> Keithley2182a {
        Keithley2182a::new("k2182a", Box::new(ScriptedTransport::new(steps)))
    }

    #[tokio::test]
    async fn test_measure_parses_scientific_notation() {
        let meter = driver(&[(":SENS:DATA:FRES?", Some(" 4.521E-06\r\n"))]);
        assert_eq!(meter.measure().await.unwrap(), 4.521e-6);
    }

    #[tokio::test]
    async fn test_measurement_mode_commands() {
        let meter = driver(&[
            (":SENS:FUNC \"VOLT:DC\"", None),
            (":SENS:FUNC?", Some("\"VOLT:DC\"\n")),
            (":SENS:FUNC TEMP", None),
        ]);
        meter
            .set_measurement_mode(MeasurementMode::Voltage)
            .await
            .unwrap();
        assert_eq!(
            meter.measurement_mode().await.unwrap(),
            MeasurementMode::Voltage
        );
        meter
            .set_measurement_mode(MeasurementMode::Temperature)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_range_validation_precedes_io() {
        // Empty script: an out-of-bounds range must not reach the transport.
        let meter = driver(&[]);
        let err = meter.set_range(200.0).await.unwrap_err();
        assert!(matches!(err, TransmeasError::OutOfRange { .. }));
        let err = meter.set_nplc(100.0).await.unwrap_err();
        assert!(matches!(err, TransmeasError::OutOfRange { .. }));
        let err = meter.set_channel(3).await.unwrap_err();
        assert!(matches!(err, TransmeasError::OutOfRange { .. }));
    }

    #[tokio::test]
    async fn test_configuration_command_grammar() {
        let meter = driver(&[
            (":SENS:VOLT:RANG:AUTO 1", None),
            (":SENS:VOLT:RANG 0.1", None),
            (":SENS:VOLT:NPLC 5", None),
            (":SYST:AZER 0", None),
            (":SENS:CHAN 1", None),
            (":SENS:VOLT:LPAS 1", None),
            (":SENS:VOLT:DFIL 0", None),
            (":DISP:ENAB 0", None),
            ("*CLS", None),
            ("*RST", None),
        ]);
        meter.set_auto_range(true).await.unwrap();
        meter.set_range(0.1).await.unwrap();
        meter.set_nplc(5.0).await.unwrap();
        meter.set_auto_zero(false).await.unwrap();
        meter.set_channel(1).await.unwrap();
        meter.set_analog_filter(true).await.unwrap();
        meter.set_digital_filter(false).await.unwrap();
        meter.set_display_enabled(false).await.unwrap();
        meter.clear().await.unwrap();
        meter.reset().await.unwrap();
    }

    #[tokio::test]
    async fn test_voltmeter_capability() {
        let meter = driver(&[(":SENS:DATA:FRES?", Some("1.0E-03"))]);
        let voltmeter: &dyn Voltmeter = &meter;
        assert_eq!(voltmeter.read_voltage().await.unwrap(), 1.0e-3);
    }

    #[tokio::test]
    async fn test_error_reply_surfaces() {
        let meter = driver(&[(":SENS:DATA:FRES?", Some("OVERFLOW"))]);
        let err = meter.measure().await.unwrap_err();
        assert!(matches!(err, TransmeasError::Instrument(_)));
    }
}
