// provider.rs — Target backends for emitted C fragments.
//
// A provider supplies every target-specific fragment the code generator
// needs: the time source, the wire handle type, and GPIO mode/read/write
// statements. Modeled as a capability trait so backends stay independent
// of the state-graph walker.

use std::fmt;

/// Direction a wire is configured for within a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireMode {
    Input,
    Output,
}

impl fmt::Display for WireMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireMode::Input => write!(f, "INPUT"),
            WireMode::Output => write!(f, "OUTPUT"),
        }
    }
}

/// C-fragment factory for one target platform.
///
/// Methods returning `String` interpolate wire names or value expressions;
/// the rest are fixed text. None of the fragments carry trailing
/// semicolons — the code generator owns statement punctuation.
pub trait Provider {
    /// Expression yielding the current microsecond timestamp.
    fn get_micros(&self) -> &'static str;
    /// Storage type for the state timing variable.
    fn time_type(&self) -> &'static str;
    /// Storage type for a wire handle.
    fn wire_type(&self) -> &'static str;
    /// Statement configuring `wire` for `mode`.
    fn set_wire_mode(&self, wire: &str, mode: WireMode) -> String;
    /// Statement driving `wire` to the bit value of `value`.
    fn write_wire_bit(&self, wire: &str, value: &str) -> String;
    /// Expression sampling the bit currently on `wire`.
    fn read_wire_bit(&self, wire: &str) -> String;
    /// Block emitted once at the top of the generated header.
    fn header_preamble(&self) -> &'static str;
}

// ── Arduino ──

/// Arduino-flavored backend: `micros()` time base and `pinMode`/
/// `digitalWrite`/`digitalRead` GPIO.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArduinoProvider;

impl Provider for ArduinoProvider {
    fn get_micros(&self) -> &'static str {
        "micros()"
    }

    fn time_type(&self) -> &'static str {
        "unsigned long"
    }

    fn wire_type(&self) -> &'static str {
        "int"
    }

    fn set_wire_mode(&self, wire: &str, mode: WireMode) -> String {
        format!("pinMode({wire}, {mode})")
    }

    fn write_wire_bit(&self, wire: &str, value: &str) -> String {
        format!("digitalWrite({wire}, {value})")
    }

    fn read_wire_bit(&self, wire: &str) -> String {
        format!("digitalRead({wire})")
    }

    fn header_preamble(&self) -> &'static str {
        "#include <Arduino.h>\n#include <stdint.h>\n"
    }
}

// ── Noisy Arduino ──

/// Arduino backend that flips each written bit with probability
/// `1/flip_one_in`, for exercising protocol robustness on real boards.
#[derive(Debug, Clone, Copy)]
pub struct NoisyArduinoProvider {
    pub flip_one_in: u32,
    inner: ArduinoProvider,
}

impl NoisyArduinoProvider {
    pub fn new(flip_one_in: u32) -> Self {
        NoisyArduinoProvider {
            flip_one_in,
            inner: ArduinoProvider,
        }
    }
}

impl Default for NoisyArduinoProvider {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl Provider for NoisyArduinoProvider {
    fn get_micros(&self) -> &'static str {
        self.inner.get_micros()
    }

    fn time_type(&self) -> &'static str {
        self.inner.time_type()
    }

    fn wire_type(&self) -> &'static str {
        self.inner.wire_type()
    }

    fn set_wire_mode(&self, wire: &str, mode: WireMode) -> String {
        self.inner.set_wire_mode(wire, mode)
    }

    fn write_wire_bit(&self, wire: &str, value: &str) -> String {
        let noisy = format!("({}) ^ (random({}) == 0)", value, self.flip_one_in);
        self.inner.write_wire_bit(wire, &noisy)
    }

    fn read_wire_bit(&self, wire: &str) -> String {
        self.inner.read_wire_bit(wire)
    }

    fn header_preamble(&self) -> &'static str {
        self.inner.header_preamble()
    }
}

// ── Tests ──
