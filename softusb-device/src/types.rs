/// Everything that can go wrong in the stack, on the bus, or at
/// configuration time.
///
/// The HAL reports the transport subset (`Nak`..`Underrun`, `Reset`,
/// `Shutdown`); the rest are produced by the stack itself. Anything a HAL
/// returns that is not in this list should be mapped to `Protocol`.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UsbError {
    /// The endpoint NAKed the transaction
    Nak,
    /// The endpoint is halted (or the host saw a STALL handshake)
    Stall,
    /// The transfer did not complete in time
    Timeout,
    /// The operation was cancelled before it completed
    Cancelled,
    /// More data arrived than the buffer could hold
    Overrun,
    /// Less data arrived than the transfer required
    Underrun,
    /// A bus reset was observed
    Reset,
    /// The controller has been stopped
    Shutdown,
    /// Transport-level failure the stack does not interpret further
    Protocol,
    /// A request field, descriptor index, or configuration value is invalid
    InvalidRequest,
    /// The request is not permitted in the current device state
    InvalidState,
    /// No such endpoint
    InvalidEndpoint,
    /// Data-endpoint I/O attempted outside the Configured state
    NotConfigured,
    /// A per-endpoint transfer queue is full
    NoResources,
    /// A fixed-capacity table is full
    NoMemory,
    /// The identifier is already in use
    Busy,
    /// The input is shorter than the descriptor it claims to hold
    DescriptorTooShort,
    /// The descriptor-type byte does not match the expected type
    DescriptorTypeMismatch,
    /// The supplied buffer is too small
    BufferTooSmall,
}

/// Negotiated bus speed, as reported by the HAL.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum Speed {
    /// 1.5 Mbit/s
    Low,
    /// 12 Mbit/s
    Full,
    /// 480 Mbit/s
    High,
    /// 5 Gbit/s (kept so a HAL can report it; the stack itself is USB 2.0)
    Super,
}

/// Device lifecycle state, USB 2.0 section 9.1.1.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "std", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum DeviceState {
    /// Attached to the bus but not powered
    Attached,
    /// Powered but not yet reset
    Powered,
    /// Reset seen; responding at address 0
    Default,
    /// Address assigned but not configured
    Address,
    /// A configuration is active
    Configured,
    /// Bus is idle; previous state is remembered for resume
    Suspended,
}
