//! Resting place for [Instruments] used by the [LogWriter](crate::LogWriter) & [LogReader](crate::LogReader)


/// Honors the *Zero-Cost Instrumentation Pattern* for the log [channel](crate::channel) ends:\
/// Designed to be used as a const generic parameter for Structs,
/// causes the conditional instrumentation code in client structs to
/// be selectively compiled -- see the implemented *const methods* for
/// documentation of each available instrument.
///
/// Note: Using this enum directly in generics --
/// as in `struct S<const INSTUMENTS: Instruments = { Instruments::NoInstruments }> {...}`
/// -- is not possible yet: *"adt const params is experimental [E0658]"*,
/// so we'll use it as `struct S<const INSTRUMENTS: usize = 0>` instead, and use [Instruments::from(INSTRUMENTS)]
/// in the instrumentable implementations & `let s = S::<{Instruments::LogsWithMetrics.into()}> {...};` in clients.
#[derive(Debug,Clone,Copy,PartialEq)]
pub enum Instruments {
    /// No conditional instrumentation code will be included -- bringing in the fastest
    /// possible polling loop, which is what latency measurements want
    NoInstruments,

    LogsWithoutMetrics,
    LogsWithMetrics,
    LogsWithTracing,
    Custom(usize),
}

impl Instruments {

    /// outputs `INFO` when a log end is opened & when its loop finishes
    const LOG:     usize = 1;
    /// if [Instruments::LOG] is enabled, the final `INFO` message carries the poll / byte counters
    const METRICS: usize = 2;
    /// outputs every poll outcome & every record in the *TRACE* level
    const TRACING: usize = 4;

    /// To be used in if conditions, returns the enum variant
    /// that corresponds to the given const generic numeric value as described in [Self]
    pub const fn from(instruments: usize) -> Self {
        Self::Custom(instruments)
    }

    /// designed to be used by clients of the implementor structs, returns the number to be used as a
    /// const generic numeric value (when instantiating the implementor struct) that corresponds
    /// to the given enum variant
    pub const fn into(self) -> usize {
        match self {
            Self::NoInstruments       => 0,
            Self::LogsWithoutMetrics  => Self::LOG,
            Self::LogsWithMetrics     => Self::LOG | Self::METRICS,
            Self::LogsWithTracing     => Self::LOG | Self::METRICS | Self::TRACING,
            Self::Custom(instruments) => instruments,
        }
    }

    /// returns whether start / finish should be logged in the `INFO` level
    pub const fn logging(self) -> bool {
        self.into() & (Self::LOG | Self::TRACING) > 0
    }

    /// returns whether counters should be included in the finishing log
    pub const fn metrics(self) -> bool {
        self.into() & Self::METRICS > 0
    }

    /// returns whether every poll & record should be logged in the `TRACE` level
    pub const fn tracing(self) -> bool {
        self.into() & Self::TRACING > 0
    }

}


/// Unit tests the [instruments](self) module
#[cfg(any(test,doc))]
mod tests {
    use super::*;

    #[cfg_attr(not(doc),test)]
    fn const_round_trip() {
        const LOGS: usize = Instruments::LogsWithoutMetrics.into();
        assert!(Instruments::from(LOGS).logging(), "`LogsWithoutMetrics` should log");
        assert!(!Instruments::from(LOGS).metrics(), "`LogsWithoutMetrics` should not report metrics");
        assert!(!Instruments::from(LOGS).tracing(), "`LogsWithoutMetrics` should not trace");

        const NONE: usize = Instruments::NoInstruments.into();
        assert_eq!(NONE, 0, "`NoInstruments` must be the zero-cost default");
        assert!(!Instruments::from(NONE).logging());

        const TRACING: usize = Instruments::LogsWithTracing.into();
        assert!(Instruments::from(TRACING).logging() && Instruments::from(TRACING).metrics() && Instruments::from(TRACING).tracing(),
                "`LogsWithTracing` should enable everything");
    }

}
