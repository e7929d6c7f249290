//! UART transport for ESP32 using esp-idf-svc

use crate::transport::RfidTransport;
use esp_idf_svc::hal::delay::{BLOCK, TickType};
use esp_idf_svc::hal::gpio::{self, InputPin, OutputPin};
use esp_idf_svc::hal::peripheral::Peripheral;
use esp_idf_svc::hal::uart::config::{Config, DataBits, FlowControl, StopBits};
use esp_idf_svc::hal::uart::{self, UartDriver};
use std::time::Duration;

/// Time the module needs after power-up before it accepts commands
const SETTLE_TIME: Duration = Duration::from_millis(500);

/// Module link over one of the ESP32 UART peripherals
pub struct UartTransport<'a> {
    uart: UartDriver<'a>,
}

impl<'a> UartTransport<'a> {
    /// Open the UART at `baud_rate`, 8N1 without flow control.
    pub fn new(
        uart: impl Peripheral<P = impl uart::Uart> + 'a,
        tx: impl Peripheral<P = impl OutputPin> + 'a,
        rx: impl Peripheral<P = impl InputPin> + 'a,
        baud_rate: u32,
    ) -> Result<Self, esp_idf_svc::sys::EspError> {
        let config = Config::new()
            .baudrate(baud_rate.into())
            .data_bits(DataBits::DataBits8)
            .parity_none()
            .stop_bits(StopBits::STOP1)
            .flow_control(FlowControl::None);
        let uart = UartDriver::new(
            uart,
            tx,
            rx,
            Option::<gpio::Gpio0>::None,
            Option::<gpio::Gpio0>::None,
            &config,
        )?;

        std::thread::sleep(SETTLE_TIME);
        uart.clear_rx()?;

        Ok(Self { uart })
    }
}

impl RfidTransport for UartTransport<'_> {
    type Error = esp_idf_svc::sys::EspError;

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        self.uart.write(data)
    }

    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Self::Error> {
        let ticks = TickType::new_millis(timeout_ms as u64).ticks();
        self.uart.read(buf, ticks)
    }

    fn buffered_len(&mut self) -> Result<usize, Self::Error> {
        self.uart.remaining_read()
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.uart.wait_tx_done(BLOCK)
    }

    fn clear_input(&mut self) -> Result<(), Self::Error> {
        self.uart.clear_rx()
    }
}
