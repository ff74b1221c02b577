
//! Straight-line execution of method bodies, used to fold calls to
//! helper definitions and to the methods of a compilation unit.

use super::{Binding, Environment, FoldResult, PartialEvaluator};
use crate::ast::{MethodDefinition, Stmt, TypeRef};
use crate::host::HostException;
use crate::value::Value;
use crate::value::ops;

enum Flow {
  Continue,
  Return(Value),
}

/// `Ok(None)` when some statement cannot be resolved.
type FlowResult = Result<Option<Flow>, HostException>;

/// Runs `method` on `args` in a fresh frame: the body sees its
/// parameters and its own locals, but none of the caller's bindings.
pub fn run_method(caller: &PartialEvaluator, method: &MethodDefinition, args: &[Value]) -> FoldResult {
  if method.params.len() != args.len() {
    return Ok(None);
  }
  let mut frame = caller.clone().with_env(Environment::new());
  for (param, arg) in method.params.iter().zip(args) {
    let value = ops::implicit_convert(arg, &param.ty)?;
    frame.scope.bind(param.name.clone(), param.ty.clone());
    frame.env_mut().bind_value(param.name.clone(), value);
  }
  match exec_block(&mut frame, &method.body, &method.return_type)? {
    Some(Flow::Return(value)) => Ok(Some(value)),
    Some(Flow::Continue) | None => Ok(None),
  }
}

fn exec_block(frame: &mut PartialEvaluator, stmts: &[Stmt], return_type: &TypeRef) -> FlowResult {
  for stmt in stmts {
    match exec(frame, stmt, return_type)? {
      Some(Flow::Continue) => {}
      other => return Ok(other),
    }
  }
  Ok(Some(Flow::Continue))
}

fn exec(frame: &mut PartialEvaluator, stmt: &Stmt, return_type: &TypeRef) -> FlowResult {
  match stmt {
    Stmt::Let { ty, name, init } => {
      let Some(value) = frame.fold(init, ty.as_ref())? else {
        return Ok(None);
      };
      let ty = ty.clone().unwrap_or_else(|| value.ty());
      let value = ops::implicit_convert(&value, &ty)?;
      frame.scope.bind(name.clone(), ty);
      frame.env_mut().bind_value(name.clone(), value);
      Ok(Some(Flow::Continue))
    }
    Stmt::Assign { name, op, value } => {
      let Some(ty) = frame.scope.local_type(name).cloned() else {
        return Ok(None);
      };
      let Some(rhs) = frame.fold(value, Some(&ty))? else {
        return Ok(None);
      };
      let value = match op {
        None => ops::implicit_convert(&rhs, &ty)?,
        Some(op) => {
          let Some(Binding::Value(current)) = frame.env().get(name).cloned() else {
            return Ok(None);
          };
          let Some(combined) = ops::binary(*op, &current, &rhs)? else {
            return Ok(None);
          };
          // Compound assignment converts back to the variable's type.
          match ops::cast(&combined, &ty)? {
            Some(value) => value,
            None => return Ok(None),
          }
        }
      };
      frame.env_mut().bind_value(name.clone(), value);
      Ok(Some(Flow::Continue))
    }
    Stmt::If { cond, then, otherwise } => {
      let Some(cond) = frame.fold(cond, Some(&TypeRef::Bool))?.and_then(|c| c.as_bool()) else {
        return Ok(None);
      };
      exec_block(frame, if cond { then } else { otherwise }, return_type)
    }
    Stmt::Block(stmts) => exec_block(frame, stmts, return_type),
    Stmt::Return(expr) => {
      let Some(value) = frame.fold(expr, Some(return_type))? else {
        return Ok(None);
      };
      Ok(Some(Flow::Return(ops::implicit_convert(&value, return_type)?)))
    }
    Stmt::Expr(expr) => Ok(frame.fold(expr, None)?.map(|_| Flow::Continue)),
  }
}
