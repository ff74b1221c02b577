
//! Strategies for `System.Linq.Enumerable` pipelines.
//!
//! A pipeline is a chain of instance calls, `xs.Where(p).Select(f)
//! .Count()`, each of which the resolver types as an extension method
//! on `Enumerable`. A stage's strategy looks back along the chain: it
//! skips the stages that are transparent to what it computes, fuses
//! neighbouring predicates, and specializes terminals whose source is
//! an array or a list. Every strategy is local to one call; the driver
//! repeats the pass until the pipeline stops changing.

mod aggregate;
mod elements;
mod filter;
mod fusion;
mod ordering;
mod query;
mod sets;
mod slicing;

use super::context::OptimizerContext;
use super::flags::StrategyFlags;
use crate::ast::{Call, Expr, Lambda, NumericType, TypeRef};
use crate::ast::purity::{is_pure, is_pure_lambda};
use crate::host::linq::items_of;
use crate::value::{Number, Value};

use log::{debug, trace};
use phf::phf_map;

use std::ptr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceStage {
  Aggregate,
  All,
  Any,
  Append,
  AsEnumerable,
  Average,
  Cast,
  Chunk,
  Concat,
  Contains,
  Count,
  DefaultIfEmpty,
  Distinct,
  DistinctBy,
  ElementAt,
  ElementAtOrDefault,
  Except,
  ExceptBy,
  First,
  FirstOrDefault,
  GroupBy,
  Intersect,
  IntersectBy,
  Last,
  LastOrDefault,
  LongCount,
  Max,
  MaxBy,
  Min,
  MinBy,
  OfType,
  Order,
  OrderBy,
  OrderByDescending,
  OrderDescending,
  Prepend,
  Reverse,
  Select,
  SelectMany,
  SequenceEqual,
  Shuffle,
  Single,
  SingleOrDefault,
  Skip,
  SkipLast,
  SkipWhile,
  Sum,
  Take,
  TakeLast,
  TakeWhile,
  ThenBy,
  ThenByDescending,
  ToArray,
  ToHashSet,
  ToList,
  Union,
  UnionBy,
  Where,
  Zip,
}

static STAGES: phf::Map<&'static str, SequenceStage> = phf_map! {
  "Aggregate" => SequenceStage::Aggregate,
  "All" => SequenceStage::All,
  "Any" => SequenceStage::Any,
  "Append" => SequenceStage::Append,
  "AsEnumerable" => SequenceStage::AsEnumerable,
  "Average" => SequenceStage::Average,
  "Cast" => SequenceStage::Cast,
  "Chunk" => SequenceStage::Chunk,
  "Concat" => SequenceStage::Concat,
  "Contains" => SequenceStage::Contains,
  "Count" => SequenceStage::Count,
  "DefaultIfEmpty" => SequenceStage::DefaultIfEmpty,
  "Distinct" => SequenceStage::Distinct,
  "DistinctBy" => SequenceStage::DistinctBy,
  "ElementAt" => SequenceStage::ElementAt,
  "ElementAtOrDefault" => SequenceStage::ElementAtOrDefault,
  "Except" => SequenceStage::Except,
  "ExceptBy" => SequenceStage::ExceptBy,
  "First" => SequenceStage::First,
  "FirstOrDefault" => SequenceStage::FirstOrDefault,
  "GroupBy" => SequenceStage::GroupBy,
  "Intersect" => SequenceStage::Intersect,
  "IntersectBy" => SequenceStage::IntersectBy,
  "Last" => SequenceStage::Last,
  "LastOrDefault" => SequenceStage::LastOrDefault,
  "LongCount" => SequenceStage::LongCount,
  "Max" => SequenceStage::Max,
  "MaxBy" => SequenceStage::MaxBy,
  "Min" => SequenceStage::Min,
  "MinBy" => SequenceStage::MinBy,
  "OfType" => SequenceStage::OfType,
  "Order" => SequenceStage::Order,
  "OrderBy" => SequenceStage::OrderBy,
  "OrderByDescending" => SequenceStage::OrderByDescending,
  "OrderDescending" => SequenceStage::OrderDescending,
  "Prepend" => SequenceStage::Prepend,
  "Reverse" => SequenceStage::Reverse,
  "Select" => SequenceStage::Select,
  "SelectMany" => SequenceStage::SelectMany,
  "SequenceEqual" => SequenceStage::SequenceEqual,
  "Shuffle" => SequenceStage::Shuffle,
  "Single" => SequenceStage::Single,
  "SingleOrDefault" => SequenceStage::SingleOrDefault,
  "Skip" => SequenceStage::Skip,
  "SkipLast" => SequenceStage::SkipLast,
  "SkipWhile" => SequenceStage::SkipWhile,
  "Sum" => SequenceStage::Sum,
  "Take" => SequenceStage::Take,
  "TakeLast" => SequenceStage::TakeLast,
  "TakeWhile" => SequenceStage::TakeWhile,
  "ThenBy" => SequenceStage::ThenBy,
  "ThenByDescending" => SequenceStage::ThenByDescending,
  "ToArray" => SequenceStage::ToArray,
  "ToHashSet" => SequenceStage::ToHashSet,
  "ToList" => SequenceStage::ToList,
  "Union" => SequenceStage::Union,
  "UnionBy" => SequenceStage::UnionBy,
  "Where" => SequenceStage::Where,
  "Zip" => SequenceStage::Zip,
};

impl SequenceStage {
  pub fn from_name(name: &str) -> Option<SequenceStage> {
    STAGES.get(name).copied()
  }

  /// Argument counts this stage has a strategy for.
  pub fn arities(self) -> &'static [usize] {
    use SequenceStage::*;
    match self {
      AsEnumerable | Cast | DefaultIfEmpty | Distinct | OfType | Order | OrderDescending | Reverse |
      Shuffle | ToArray | ToHashSet | ToList => &[0],
      Any | Average | Count | First | FirstOrDefault | Last | LastOrDefault | LongCount | Max | Min |
      Single | SingleOrDefault | Sum => &[0, 1],
      ExceptBy | IntersectBy | UnionBy => &[2],
      Aggregate => &[1, 2, 3],
      _ => &[1],
    }
  }

  pub fn flags(self) -> StrategyFlags {
    use SequenceStage::*;
    let reordering = StrategyFlags::REORDERS | StrategyFlags::PRESERVES_ELEMENTS | StrategyFlags::PRESERVES_COUNT;
    let copying = StrategyFlags::MATERIALIZES | StrategyFlags::PRESERVES_ELEMENTS | StrategyFlags::PRESERVES_COUNT;
    match self {
      Order | OrderDescending | Shuffle => reordering | StrategyFlags::IS_IDEMPOTENT,
      OrderBy | OrderByDescending | ThenBy | ThenByDescending => reordering,
      Reverse => reordering | StrategyFlags::IS_INVOLUTION,
      AsEnumerable => copying | StrategyFlags::IS_IDEMPOTENT,
      ToArray | ToList => copying,
      Select | Cast => StrategyFlags::PRESERVES_COUNT,
      Distinct | OfType => StrategyFlags::IS_IDEMPOTENT,
      First | FirstOrDefault | Last | LastOrDefault | ElementAt | ElementAtOrDefault | Aggregate |
      Skip | SkipLast | Take | TakeLast | SkipWhile | TakeWhile | Zip | SequenceEqual | Chunk |
      MaxBy | MinBy | Average | Sum => StrategyFlags::ORDER_SENSITIVE,
      _ => StrategyFlags::empty(),
    }
  }

  /// `AsEnumerable`, `ToList` and `ToArray`.
  pub fn is_materializing(self) -> bool {
    self.flags().contains(StrategyFlags::MATERIALIZES)
  }

  /// The `Order` and `ThenBy` families.
  pub fn is_sort(self) -> bool {
    use SequenceStage::*;
    matches!(self, Order | OrderDescending | OrderBy | OrderByDescending | ThenBy | ThenByDescending)
  }
}

/// A validated sequence call.
#[derive(Debug, Clone)]
pub(crate) struct StageSite<'c, 'a> {
  pub ctx: &'c OptimizerContext<'a>,
  pub stage: SequenceStage,
  pub receiver: &'a Expr,
  /// The element type of the receiver.
  pub element: TypeRef,
}

/// Tries the sequence registry on the context's call.
pub fn try_optimize(ctx: &OptimizerContext) -> Option<Expr> {
  let call = ctx.call();
  let stage = SequenceStage::from_name(&call.name)?;
  let receiver = ctx.receiver()?;
  if !stage.arities().contains(&call.args.len()) || !ctx.signature().is_enumerable() {
    return None;
  }
  let element = ctx.signature().source_element_type()?.clone();
  if let Some(folded) = ctx.fold_call() {
    debug!("Folded {call} to {folded}");
    return Some(folded);
  }
  let site = StageSite { ctx, stage, receiver, element };
  let rewritten = site.rewrite()?;
  let rewritten = site.retype(rewritten)?;
  if rewritten == Expr::Call(call.clone()) {
    return None;
  }
  debug!("{}: {call} => {rewritten}", call.name);
  Some(rewritten)
}

impl<'c, 'a> StageSite<'c, 'a> {
  fn rewrite(&self) -> Option<Expr> {
    use SequenceStage::*;
    self.idempotence()
      .or_else(|| match self.stage {
        Where | Select | SelectMany | SkipWhile | TakeWhile | Cast | OfType | Chunk | AsEnumerable => {
          filter::rewrite(self)
        }
        Any | All | Count | LongCount | Contains | SequenceEqual => query::rewrite(self),
        Aggregate | Sum | Average | Max | Min | MaxBy | MinBy => aggregate::rewrite(self),
        First | FirstOrDefault | Last | LastOrDefault | Single | SingleOrDefault | ElementAt |
        ElementAtOrDefault => elements::rewrite(self),
        Order | OrderDescending | OrderBy | OrderByDescending | ThenBy | ThenByDescending | Reverse |
        Shuffle => ordering::rewrite(self),
        Distinct | DistinctBy | Union | UnionBy | Intersect | IntersectBy | Except | ExceptBy | Concat |
        Append | Prepend | Zip => sets::rewrite(self),
        Skip | SkipLast | Take | TakeLast | DefaultIfEmpty | ToArray | ToList | ToHashSet | GroupBy => {
          slicing::rewrite(self)
        }
      })
  }

  /// `xs.S().S()` to `xs.S()` for an idempotent stage, and to `xs` for
  /// an involution.
  fn idempotence(&self) -> Option<Expr> {
    let flags = self.stage.flags();
    if !flags.intersects(StrategyFlags::IS_IDEMPOTENT | StrategyFlags::IS_INVOLUTION) {
      return None;
    }
    let inner = self.upstream_is(self.stage)?;
    let call = self.call();
    if inner.args != call.args || inner.type_args != call.type_args {
      return None;
    }
    if flags.contains(StrategyFlags::IS_INVOLUTION) {
      Some(inner.receiver()?.clone())
    } else {
      Some(self.receiver.clone())
    }
  }

  pub fn call(&self) -> &'a Call {
    self.ctx.call()
  }

  pub fn args(&self) -> &'a [Expr] {
    self.ctx.args()
  }

  pub fn arg(&self, index: usize) -> Option<&'a Expr> {
    self.ctx.arg(index)
  }

  pub fn lambda(&self, index: usize) -> Option<&'a Lambda> {
    self.ctx.lambda_arg(index)
  }

  pub fn name(&self) -> &'a str {
    &self.call().name
  }

  pub fn return_type(&self) -> &TypeRef {
    &self.ctx.signature().return_type
  }

  /// Whether the elements are of an integer type, for which any two
  /// equal elements are indistinguishable.
  pub fn has_integer_elements(&self) -> bool {
    self.element.as_numeric().is_some_and(NumericType::is_integer)
  }

  /// `expr` as a stage call whose signature resolves on `Enumerable`.
  pub fn stage_call(&self, expr: &'a Expr) -> Option<(SequenceStage, &'a Call)> {
    let call = expr.unparen().as_call()?;
    call.receiver()?;
    let stage = SequenceStage::from_name(&call.name)?;
    let signature = self.ctx.resolve_call(call)?;
    signature.is_enumerable().then_some((stage, call))
  }

  /// The stage immediately before this one.
  pub fn upstream(&self) -> Option<(SequenceStage, &'a Call)> {
    self.stage_call(self.receiver)
  }

  pub fn upstream_is(&self, stage: SequenceStage) -> Option<&'a Call> {
    match self.upstream()? {
      (s, call) if s == stage => Some(call),
      _ => None,
    }
  }

  /// Walks back from `from` through every stage that `transparent`
  /// accepts and whose arguments are pure, and returns the first
  /// expression that is not such a stage.
  pub fn skip<F>(&self, from: &'a Expr, transparent: F) -> &'a Expr
  where F: Fn(SequenceStage, &Call) -> bool {
    let mut source = from;
    while let Some((stage, call)) = self.stage_call(source) {
      if !transparent(stage, call) || !call.args.iter().all(is_pure_argument) {
        break;
      }
      let Some(next) = call.receiver() else {
        break;
      };
      trace!("{} skips {}", self.name(), call.name);
      source = next;
    }
    source
  }

  /// This call with its receiver moved past the stages `transparent`
  /// accepts, or `None` if there are none to skip.
  pub fn skip_receiver<F>(&self, transparent: F) -> Option<Expr>
  where F: Fn(SequenceStage, &Call) -> bool {
    let source = self.skip(self.receiver, transparent);
    (!ptr::eq(source, self.receiver)).then(|| self.rebuild(source))
  }

  /// Drops `AsEnumerable`, `ToList` and `ToArray` stages before this
  /// one.
  pub fn skip_materializing(&self) -> Option<Expr> {
    self.skip_receiver(|stage, _| stage.is_materializing())
  }

  /// This call on a different receiver.
  pub fn rebuild(&self, source: &Expr) -> Expr {
    Expr::Call(self.call().with_receiver(source.clone()))
  }

  /// `source.name(args)`.
  pub fn stage_on(&self, source: &Expr, name: &str, args: Vec<Expr>) -> Expr {
    Expr::Call(Call::on(source.clone(), name, args))
  }

  /// `expr` with the static type of this call: unchanged if it already
  /// has it, wrapped in `.AsEnumerable()` if this call produces an
  /// `IEnumerable<T>` and `expr` is some other sequence of `T`, and
  /// otherwise `None`.
  pub fn retype(&self, expr: Expr) -> Option<Expr> {
    let want = self.return_type();
    let Some(got) = self.ctx.resolve_type(&expr) else {
      trace!("{expr} has no type");
      return None;
    };
    if &got == want {
      return Some(expr);
    }
    if want.is_named("IEnumerable") && got.element_type() == want.element_type() {
      return Some(Expr::Call(Call::on(expr, "AsEnumerable", Vec::new())));
    }
    trace!("{expr} has type {got}, not {want}");
    None
  }

  /// An empty sequence of this call's element type, `Enumerable.Empty<T>()`.
  pub fn empty(&self) -> Option<Expr> {
    let element = self.return_type().element_type()?;
    Some(Value::empty_sequence_expr(element.clone()))
  }

  /// [`Self::empty`], when `dropped` can be left unevaluated.
  pub fn empty_dropping(&self, dropped: &Expr) -> Option<Expr> {
    if self.droppable(dropped) { self.empty() } else { None }
  }

  /// Evaluating `expr` has no effect a rewrite could lose.
  pub fn droppable(&self, expr: &Expr) -> bool {
    is_pure(expr) || self.ctx.fold_value(expr).is_some()
  }

  /// The items `expr` folds to, if it is a sequence.
  pub fn items(&self, expr: &Expr) -> Option<Vec<Value>> {
    let value = self.ctx.fold_value(expr)?;
    items_of(&value).map(|items| items.as_ref().clone())
  }

  pub fn is_empty_source(&self, expr: &Expr) -> bool {
    self.items(expr).is_some_and(|items| items.is_empty())
  }

  /// The value that the predicate passed as argument `index` always
  /// returns.
  pub fn literal_predicate(&self, index: usize) -> Option<bool> {
    self.lambda(index)?;
    self.ctx.constant_lambda(index)?.as_bool()
  }

  /// Argument `index` of `call` as an integer, if it is pure and folds.
  pub fn literal_int(&self, call: &Call, index: usize) -> Option<i64> {
    let arg = call.args.get(index)?;
    if !is_pure(arg) {
      return None;
    }
    self.ctx.fold_int(arg)
  }

  /// A literal of the call's integer return type.
  pub fn count_literal(&self, n: i64) -> Option<Expr> {
    let ty = self.return_type().as_numeric()?;
    Some(Expr::number(Number::Int64(n).convert(ty).ok()?))
  }

  /// Two pure expressions that read the same.
  pub fn same(&self, a: &Expr, b: &Expr) -> bool {
    is_pure(a) && a.unparen() == b.unparen()
  }
}

fn is_pure_argument(arg: &Expr) -> bool {
  match arg.unparen() {
    Expr::Lambda(lambda) => is_pure_lambda(lambda),
    other => is_pure(other),
  }
}

#[cfg(test)]
pub(crate) mod testing {
  pub use crate::optimizer::numeric::testing::{eval_with, rewrite, rewrite_expr, rewrite_str, session};

  use crate::ast::{NumericType, TypeRef};
  use crate::optimizer::{EvaluationMode, Session};
  use crate::parsing::parse_expr;
  use crate::value::{Number, Sequence, Value};

  pub fn ints(values: &[i32]) -> Value {
    let items = values.iter().map(|n| Value::Number(Number::Int32(*n))).collect();
    Value::Sequence(Sequence::array(TypeRef::Numeric(NumericType::Int32), items))
  }

  /// A session with `xs` and `ys` of type `int[]`, `e` an
  /// `IEnumerable<int>`, `ds` a `double[]`, `words` a `string[]`,
  /// `list` a `List<int>`, and `n` and `v` plain `int`s.
  pub fn sequences(mode: EvaluationMode) -> Session {
    let int = TypeRef::Numeric(NumericType::Int32);
    session(mode, &[
      ("xs", TypeRef::array(int.clone())),
      ("ys", TypeRef::array(int.clone())),
      ("e", TypeRef::enumerable(int.clone())),
      ("ds", TypeRef::array(TypeRef::Numeric(NumericType::Double))),
      ("words", TypeRef::array(TypeRef::String)),
      ("list", TypeRef::list(int.clone())),
      ("n", int.clone()),
      ("v", int),
    ])
  }

  /// Evaluates `source` and its rewrite with `xs` bound to each of
  /// `samples`, and asserts that they produce the same items, or the
  /// same scalar, or raise the same exception.
  pub fn assert_same_results(session: &Session, source: &str, samples: &[&[i32]]) {
    let original = parse_expr(source).unwrap();
    let rewritten = rewrite(session, source).unwrap();
    for sample in samples {
      let bindings = [("xs", ints(sample))];
      let expected = eval_with(session, &original, &bindings).map(|v| v.map(flatten));
      let actual = eval_with(session, &rewritten, &bindings).map(|v| v.map(flatten));
      assert_eq!(expected, actual, "{source} and {rewritten} differ at {sample:?}");
    }
  }

  /// Sequences compare by identity, so compare their items instead.
  fn flatten(value: Value) -> Vec<Value> {
    match &value {
      Value::Sequence(seq) => seq.items.as_ref().clone(),
      _ => vec![value],
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use super::testing::*;
  use crate::optimizer::EvaluationMode;
  use crate::parsing::parse_expr;

  #[test]
  fn test_registry_lookup() {
    assert_eq!(SequenceStage::from_name("Where"), Some(SequenceStage::Where));
    assert_eq!(SequenceStage::from_name("Sin"), None);
    assert!(SequenceStage::Count.arities().contains(&1));
    assert!(SequenceStage::ToList.is_materializing());
    assert!(SequenceStage::ThenBy.is_sort());
    assert!(!SequenceStage::Reverse.is_sort());
    assert!(SequenceStage::Reverse.flags().contains(StrategyFlags::IS_INVOLUTION));
  }

  #[test]
  fn test_folds_literal_pipeline() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "new[] { 1, 2, 3, 4 }.Where(x => x > 1).Count()").unwrap(), "3");
    assert_eq!(rewrite_str(&session, "new[] { 3, 1, 2 }.Order().ToArray()").unwrap(), "new int[] { 1, 2, 3 }");
    assert_eq!(
      rewrite_str(&session, "new int[] { }.First()").unwrap(),
      "throw new System.InvalidOperationException(\"Sequence contains no elements\")",
    );
  }

  #[test]
  fn test_lazy_results_do_not_fold() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "new[] { 1, 2 }.Where(x => x > 1)"), None);
  }

  #[test]
  fn test_idempotent_and_involutive_stages() {
    let session = sequences(EvaluationMode::Exact);
    assert_eq!(rewrite_str(&session, "xs.Distinct().Distinct()").unwrap(), "xs.Distinct()");
    assert_eq!(rewrite_str(&session, "e.Reverse().Reverse()").unwrap(), "e");
    assert_eq!(rewrite_str(&session, "xs.Reverse().Reverse()").unwrap(), "xs.AsEnumerable()");
    assert_eq!(rewrite_str(&session, "xs.Shuffle().Shuffle()").unwrap(), "xs.Shuffle()");
  }

  #[test]
  fn test_rewrites_settle() {
    let session = sequences(EvaluationMode::Exact);
    for source in [
      "e.Where(x => x % 2 == 0).Where(x => x > 2).Count()",
      "xs.ToList().Where(x => x > 0).Any()",
      "xs.OrderBy(x => x).First()",
      "e.Skip(1).Skip(2).ElementAt(3)",
      "xs.Where(x => true)",
    ] {
      let mut expr = parse_expr(source).unwrap();
      let settled = (0..10).any(|_| match expr.as_call().and_then(|_| rewrite_expr(&session, &expr)) {
        Some(next) => {
          expr = next;
          false
        }
        None => true,
      });
      assert!(settled, "{source} did not settle: {expr}");
    }
  }
}
