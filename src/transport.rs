/// Trait for RFID module communication backends.
/// Implement this trait for different transports (UART, serial port, etc.)
pub trait RfidTransport {
    /// Error type for transport operations
    type Error: std::fmt::Debug;

    /// Write data to the transport, returning the number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Read data from the transport with a timeout in milliseconds.
    /// Returns `Ok(0)` when nothing arrived before the timeout.
    fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, Self::Error>;

    /// Number of received bytes waiting in the input buffer
    fn buffered_len(&mut self) -> Result<usize, Self::Error>;

    /// Block until all written data has been transmitted
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Clear the input buffer
    fn clear_input(&mut self) -> Result<(), Self::Error>;
}
