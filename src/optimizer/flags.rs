
use bitflags::bitflags;

bitflags! {
  /// Algebraic properties of a function or pipeline stage that
  /// strategies may rely on.
  #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
  pub struct StrategyFlags: u32 {
    /// Applying the operation twice, with the same extra arguments, is
    /// the same as applying it once. That is, `f(f(x))` can simplify
    /// to `f(x)`, and `xs.S().S()` to `xs.S()`.
    const IS_IDEMPOTENT = 0b0000_0001;
    /// The operation undoes itself: `f(f(x))` can simplify to `x`.
    const IS_INVOLUTION = 0b0000_0010;
    /// The result depends on the order in which the source produces
    /// its elements, so a preceding reordering stage is not
    /// transparent to it.
    const ORDER_SENSITIVE = 0b0000_0100;
    /// A sequence stage whose output holds exactly the elements of its
    /// input, possibly reordered.
    const PRESERVES_ELEMENTS = 0b0000_1000;
    /// A sequence stage whose output has as many elements as its
    /// input.
    const PRESERVES_COUNT = 0b0001_0000;
    /// A sequence stage that only reorders its input.
    const REORDERS = 0b0010_0000;
    /// A sequence stage that copies or rewraps its input without
    /// changing elements or order.
    const MATERIALIZES = 0b0100_0000;
  }
}
