//! Boolean gate evaluation.
//!
//! A [`GateKind`] is a pure function from an ordered bit vector to a single
//! output bit. Evaluation carries no state and no float arithmetic, so every
//! observer that sees the same effective inputs computes the same output.
//! Input ordering is defined by the team container (ascending lexicographic
//! player id order), not here.

use std::fmt;

use crate::Bit;

/// The boolean gate types a team can be assigned.
///
/// Exact truth tables, no rounding ambiguity:
///
/// | Gate | Output is `1` iff |
/// |------|--------------------|
/// | AND  | every input is `1` |
/// | OR   | at least one input is `1` |
/// | NOT  | the first input is `0` |
/// | NAND | not every input is `1` |
/// | NOR  | no input is `1` |
/// | XOR  | the count of `1` inputs is odd |
/// | XNOR | the count of `1` inputs is even |
///
/// An empty input sequence always yields `0`. NOT is formally unary; for
/// multi-player teams only the first ordered input is consulted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GateKind {
    /// All inputs must be `1`.
    And,
    /// At least one input must be `1`.
    Or,
    /// Inverts the first input.
    Not,
    /// Negation of [`And`](GateKind::And).
    Nand,
    /// Negation of [`Or`](GateKind::Or).
    Nor,
    /// `1` iff an odd number of inputs are `1`.
    Xor,
    /// `1` iff an even number of inputs are `1`.
    Xnor,
}

/// The gate rotation used for asymmetric assignment, one step per round.
pub const GATE_ROTATION: [GateKind; 6] = [
    GateKind::And,
    GateKind::Or,
    GateKind::Xor,
    GateKind::Xnor,
    GateKind::Nand,
    GateKind::Nor,
];

impl GateKind {
    /// Evaluates the gate over an ordered bit sequence.
    ///
    /// An empty sequence yields `0` regardless of gate type.
    ///
    /// # Examples
    ///
    /// ```
    /// use logic_arena::{Bit, GateKind};
    ///
    /// let bits = [Bit::ONE, Bit::ZERO];
    /// assert_eq!(GateKind::Xor.evaluate(&bits), Bit::ONE);
    /// assert_eq!(GateKind::And.evaluate(&bits), Bit::ZERO);
    /// assert_eq!(GateKind::Nand.evaluate(&bits), Bit::ONE);
    /// assert_eq!(GateKind::And.evaluate(&[]), Bit::ZERO);
    /// ```
    #[must_use]
    pub fn evaluate(self, inputs: &[Bit]) -> Bit {
        if inputs.is_empty() {
            return Bit::ZERO;
        }
        let ones = inputs.iter().filter(|bit| bit.as_bool()).count();
        let output = match self {
            GateKind::And => ones == inputs.len(),
            GateKind::Or => ones > 0,
            GateKind::Not => !inputs[0].as_bool(),
            GateKind::Nand => ones != inputs.len(),
            GateKind::Nor => ones == 0,
            GateKind::Xor => ones % 2 == 1,
            GateKind::Xnor => ones % 2 == 0,
        };
        Bit::new(output)
    }

    /// Points a team earns for solving this gate, scaled by difficulty.
    ///
    /// OR is the easy gate (one point); the parity gates are the hard ones
    /// (three points); everything else is worth two.
    #[inline]
    #[must_use]
    pub const fn points(self) -> u32 {
        match self {
            GateKind::Or => 1,
            GateKind::Xor | GateKind::Xnor => 3,
            GateKind::And | GateKind::Nand | GateKind::Nor | GateKind::Not => 2,
        }
    }
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GateKind::And => "AND",
            GateKind::Or => "OR",
            GateKind::Not => "NOT",
            GateKind::Nand => "NAND",
            GateKind::Nor => "NOR",
            GateKind::Xor => "XOR",
            GateKind::Xnor => "XNOR",
        };
        f.write_str(name)
    }
}

// #########
// # TESTS #
// #########
