use crate::language::ast::*;
use crate::language::span::Span;
use crate::runtime::error::{ErrorKind, RuntimeError, RuntimeResult};
use crate::runtime::expr::{navigate, navigate_mut, EvalContext};
use crate::runtime::registry::{ModuleRegistry, RegisteredFunction};
use crate::runtime::scope::{Frame, Slot};
use crate::runtime::sync::{SyncHub, ThreadContext};
use crate::runtime::value::{apply_modop, Value};
use num_traits::{Signed, ToPrimitive};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }

    fn is_reverse(self) -> bool {
        matches!(self, Direction::Reverse)
    }
}

/// Signal produced by a firing `catch`; consumed by the enclosing `try`.
enum Flow {
    Normal,
    Caught,
}

/// Sets up the registry-backed runtime and calls `main` forward on the root
/// thread, with `argv` bound in its frame.
pub fn run_program(
    registry: Arc<ModuleRegistry>,
    argv: Value,
    default_threads: u32,
) -> RuntimeResult<()> {
    let entry = registry
        .main_function()
        .cloned()
        .ok_or_else(|| RuntimeError::bare(ErrorKind::Load("There is no main function".into())))?;
    let mut interp = Interpreter {
        registry: Arc::clone(&registry),
        hub: Arc::new(SyncHub::new()),
        thread: ThreadContext::root(),
        default_threads,
        frame: Frame::new(),
    };
    interp
        .frame
        .bind("argv", Slot::owned(argv, false))
        .map_err(RuntimeError::bare)?;
    interp
        .run_function(&entry, Direction::Forward)
        .map_err(|err| err.in_function(&entry.def.name))
}

pub struct Interpreter {
    registry: Arc<ModuleRegistry>,
    hub: Arc<SyncHub>,
    thread: ThreadContext,
    default_threads: u32,
    frame: Frame,
}

impl Interpreter {
    /// Builds a root-thread interpreter with an empty frame. Callers bind
    /// argument slots directly before invoking `call`.
    pub fn new(registry: Arc<ModuleRegistry>, default_threads: u32) -> Self {
        Self {
            registry,
            hub: Arc::new(SyncHub::new()),
            thread: ThreadContext::root(),
            default_threads,
            frame: Frame::new(),
        }
    }

    pub fn frame_mut(&mut self) -> &mut Frame {
        &mut self.frame
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Invokes a function by name with the current frame as its scope.
    /// The frame must already hold bindings for every parameter.
    pub fn call(&mut self, name: &str, direction: Direction) -> RuntimeResult<()> {
        let func = self.registry.function(name).cloned().ok_or_else(|| {
            RuntimeError::bare(ErrorKind::Scope(format!("Function '{}' does not exist", name)))
        })?;
        self.run_function(&func, direction)
            .map_err(|err| err.in_function(name))
    }

    fn ctx(&self) -> EvalContext<'_> {
        EvalContext {
            frame: &self.frame,
            globals: &self.registry.globals,
            thread: self.thread,
        }
    }

    fn run_function(
        &mut self,
        func: &RegisteredFunction,
        direction: Direction,
    ) -> RuntimeResult<()> {
        let def = &func.def;
        let flow = self
            .run_block(&def.body, direction)
            .map_err(|err| err.with_path(&func.path))?;
        if matches!(flow, Flow::Caught) {
            return Err(RuntimeError::new(
                ErrorKind::Scope("'catch' outside of a try block".into()),
                def.span,
            ));
        }
        let keep: Vec<&str> = def
            .borrow_params
            .iter()
            .chain(def.inout_params.iter())
            .map(|p| p.name.as_str())
            .filter(|name| !is_mono_name(name))
            .collect();
        self.frame
            .close(&keep)
            .map_err(|kind| RuntimeError::new(kind, def.span).with_path(&func.path))
    }

    fn run_block(&mut self, statements: &[Statement], direction: Direction) -> RuntimeResult<Flow> {
        match direction {
            Direction::Forward => {
                for statement in statements {
                    if let Flow::Caught = self.eval_stmt(statement, direction)? {
                        return Ok(Flow::Caught);
                    }
                }
            }
            Direction::Reverse => {
                for statement in statements.iter().rev() {
                    if let Flow::Caught = self.eval_stmt(statement, direction)? {
                        return Ok(Flow::Caught);
                    }
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn eval_stmt(&mut self, statement: &Statement, direction: Direction) -> RuntimeResult<Flow> {
        // Monodirectional statements exist only in forward time
        if direction.is_reverse() && statement.is_mono() {
            return Ok(Flow::Normal);
        }
        match statement {
            Statement::Let(s) => {
                if direction.is_reverse() {
                    self.unbind(&s.name, s.rhs.as_ref(), s.is_mono, s.span)?;
                } else {
                    self.bind(&s.name, s.rhs.as_ref(), s.span)?;
                }
                Ok(Flow::Normal)
            }
            Statement::Unlet(s) => {
                if direction.is_reverse() {
                    self.bind(&s.name, s.rhs.as_ref(), s.span)?;
                } else {
                    self.unbind(&s.name, s.rhs.as_ref(), s.is_mono, s.span)?;
                }
                Ok(Flow::Normal)
            }
            Statement::Push(s) => {
                if direction.is_reverse() {
                    self.stack_pop(s)?;
                } else {
                    self.stack_push(s)?;
                }
                Ok(Flow::Normal)
            }
            Statement::Pop(s) => {
                if direction.is_reverse() {
                    self.stack_push(s)?;
                } else {
                    self.stack_pop(s)?;
                }
                Ok(Flow::Normal)
            }
            Statement::Swap(s) => {
                self.eval_swap(s)?;
                Ok(Flow::Normal)
            }
            Statement::Promote(s) => {
                self.eval_promote(s, direction)?;
                Ok(Flow::Normal)
            }
            Statement::Modop(s) => {
                self.eval_modop(s, direction)?;
                Ok(Flow::Normal)
            }
            Statement::If(s) => self.eval_if(s, direction),
            Statement::Loop(s) => self.eval_loop(s, direction),
            Statement::For(s) => self.eval_for(s, direction),
            Statement::Try(s) => self.eval_try(s, direction),
            Statement::Catch(s) => {
                if direction.is_reverse() {
                    return Ok(Flow::Normal);
                }
                if self.ctx().eval_truthy(&s.predicate)? {
                    Ok(Flow::Caught)
                } else {
                    Ok(Flow::Normal)
                }
            }
            Statement::DoUndo(s) => self.eval_do_undo(s, direction),
            Statement::Barrier(s) => {
                self.hub
                    .barrier(&s.name, &self.thread)
                    .map_err(|kind| RuntimeError::new(kind, s.span))?;
                Ok(Flow::Normal)
            }
            Statement::Mutex(s) => {
                let guard = self
                    .hub
                    .acquire(&s.name)
                    .map_err(|kind| RuntimeError::new(kind, s.span))?;
                let result = self.run_block(&s.body, direction);
                drop(guard);
                result
            }
            Statement::Call(s) => {
                self.eval_call(s, direction)?;
                Ok(Flow::Normal)
            }
            Statement::Print(s) => {
                if !direction.is_reverse() {
                    self.eval_print(s)?;
                }
                Ok(Flow::Normal)
            }
        }
    }

    // ---------------- Let / unlet ----------------

    fn bind(&mut self, name: &str, rhs: Option<&Expr>, span: Span) -> RuntimeResult<()> {
        let value = match rhs {
            Some(expr) => self.ctx().eval(expr)?,
            None => Value::zero(),
        };
        self.frame
            .bind(name, Slot::owned(value, is_mono_name(name)))
            .map_err(|kind| RuntimeError::new(kind, span))
    }

    fn unbind(
        &mut self,
        name: &str,
        rhs: Option<&Expr>,
        is_mono: bool,
        span: Span,
    ) -> RuntimeResult<()> {
        let expected = if is_mono {
            None
        } else {
            Some(match rhs {
                Some(expr) => self.ctx().eval(expr)?,
                None => Value::zero(),
            })
        };
        let slot = self
            .frame
            .remove(name)
            .map_err(|kind| RuntimeError::new(kind, span))?;
        if slot.borrowed {
            return Err(RuntimeError::new(
                ErrorKind::Scope(format!("Unletting borrowed reference '{}'", name)),
                span,
            ));
        }
        if let Some(expected) = expected {
            if slot.value() != expected {
                return Err(RuntimeError::new(
                    ErrorKind::Reversibility(format!(
                        "Variable '{}' does not match its expression at unlet",
                        name
                    )),
                    span,
                ));
            }
        }
        Ok(())
    }

    // ---------------- Push / pop / swap / promote ----------------

    fn stack_push(&mut self, s: &StackStmt) -> RuntimeResult<()> {
        let value_slot = self
            .frame
            .remove(&s.name)
            .map_err(|kind| RuntimeError::new(kind, s.span))?;
        if value_slot.borrowed {
            return Err(RuntimeError::new(
                ErrorKind::Scope(format!("Pushing borrowed reference '{}'", s.name)),
                s.span,
            ));
        }
        let value = value_slot.value();
        let path = self.ctx().eval_index_path(&s.stack)?;
        let slot = self.local_slot(&s.stack.name, s.span)?;
        let mut guard = slot.cell.lock().unwrap();
        let target = navigate_mut(&mut guard, &path, &s.stack.name)
            .map_err(|kind| RuntimeError::new(kind, s.span))?;
        match target {
            Value::Array(items) => items.push(value),
            Value::Number(_) => {
                return Err(RuntimeError::new(
                    ErrorKind::Type(format!(
                        "Pushing onto '{}' which is a number, not an array",
                        s.stack.name
                    )),
                    s.span,
                ));
            }
        }
        Ok(())
    }

    fn stack_pop(&mut self, s: &StackStmt) -> RuntimeResult<()> {
        let path = self.ctx().eval_index_path(&s.stack)?;
        let slot = self.local_slot(&s.stack.name, s.span)?;
        let popped = {
            let mut guard = slot.cell.lock().unwrap();
            let target = navigate_mut(&mut guard, &path, &s.stack.name)
                .map_err(|kind| RuntimeError::new(kind, s.span))?;
            match target {
                Value::Array(items) => items.pop().ok_or_else(|| {
                    RuntimeError::new(
                        ErrorKind::Index(format!(
                            "Popping from empty array '{}'",
                            s.stack.name
                        )),
                        s.span,
                    )
                })?,
                Value::Number(_) => {
                    return Err(RuntimeError::new(
                        ErrorKind::Type(format!(
                            "Popping from '{}' which is a number, not an array",
                            s.stack.name
                        )),
                        s.span,
                    ));
                }
            }
        };
        self.frame
            .bind(&s.name, Slot::owned(popped, is_mono_name(&s.name)))
            .map_err(|kind| RuntimeError::new(kind, s.span))
    }

    fn eval_swap(&mut self, s: &SwapStmt) -> RuntimeResult<()> {
        let left_path = self.ctx().eval_index_path(&s.left)?;
        let right_path = self.ctx().eval_index_path(&s.right)?;
        let left = self.local_slot(&s.left.name, s.span)?;
        let right = self.local_slot(&s.right.name, s.span)?;
        let map_err = |kind| RuntimeError::new(kind, s.span);

        if left.shares_storage_with(&right) {
            let mut guard = left.cell.lock().unwrap();
            let a = navigate(&guard, &left_path, &s.left.name)
                .map_err(map_err)?
                .clone();
            let b = navigate(&guard, &right_path, &s.right.name)
                .map_err(map_err)?
                .clone();
            *navigate_mut(&mut guard, &left_path, &s.left.name).map_err(map_err)? = b;
            *navigate_mut(&mut guard, &right_path, &s.right.name).map_err(map_err)? = a;
            return Ok(());
        }

        // Lock in address order so concurrent swaps cannot deadlock
        let left_first = Arc::as_ptr(&left.cell) as usize <= Arc::as_ptr(&right.cell) as usize;
        let guard_left;
        let guard_right;
        if left_first {
            guard_left = left.cell.lock().unwrap();
            guard_right = right.cell.lock().unwrap();
        } else {
            guard_right = right.cell.lock().unwrap();
            guard_left = left.cell.lock().unwrap();
        }
        let mut guard_left = guard_left;
        let mut guard_right = guard_right;
        let a = navigate_mut(&mut guard_left, &left_path, &s.left.name).map_err(map_err)?;
        let b = navigate_mut(&mut guard_right, &right_path, &s.right.name).map_err(map_err)?;
        std::mem::swap(a, b);
        Ok(())
    }

    fn eval_promote(&mut self, s: &PromoteStmt, direction: Direction) -> RuntimeResult<()> {
        match direction {
            Direction::Forward => {
                let slot = self
                    .frame
                    .remove(&s.src)
                    .map_err(|kind| RuntimeError::new(kind, s.span))?;
                if slot.borrowed {
                    return Err(RuntimeError::new(
                        ErrorKind::Scope(format!("Promoting borrowed reference '{}'", s.src)),
                        s.span,
                    ));
                }
                self.frame
                    .bind(
                        &s.dst,
                        Slot {
                            cell: slot.cell,
                            mono: false,
                            borrowed: false,
                        },
                    )
                    .map_err(|kind| RuntimeError::new(kind, s.span))
            }
            Direction::Reverse => {
                let slot = self
                    .frame
                    .remove(&s.dst)
                    .map_err(|kind| RuntimeError::new(kind, s.span))?;
                if slot.borrowed {
                    return Err(RuntimeError::new(
                        ErrorKind::Scope(format!(
                            "Unpromoting borrowed reference '{}'",
                            s.dst
                        )),
                        s.span,
                    ));
                }
                Ok(())
            }
        }
    }

    // ---------------- Modop ----------------

    fn eval_modop(&mut self, s: &ModopStmt, direction: Direction) -> RuntimeResult<()> {
        let op = if direction.is_reverse() {
            s.op.inverse().ok_or_else(|| {
                RuntimeError::new(
                    ErrorKind::Reversibility(format!(
                        "Modification '{}' has no inverse",
                        s.op.symbol()
                    )),
                    s.span,
                )
            })?
        } else {
            s.op
        };
        if !s.is_mono {
            let self_read = s.rhs.uses_name(&s.lookup.name)
                || s.lookup.index.iter().any(|idx| idx.uses_name(&s.lookup.name));
            if self_read {
                return Err(RuntimeError::new(
                    ErrorKind::Reversibility(format!(
                        "Modification of '{}' reads '{}' on its right-hand side",
                        s.lookup.name, s.lookup.name
                    )),
                    s.span,
                ));
            }
        }
        let rhs = self.ctx().eval_number(&s.rhs)?;
        let path = self.ctx().eval_index_path(&s.lookup)?;
        let slot = self.local_slot(&s.lookup.name, s.span)?;
        let mut guard = slot.cell.lock().unwrap();
        let target = navigate_mut(&mut guard, &path, &s.lookup.name)
            .map_err(|kind| RuntimeError::new(kind, s.span))?;
        match target {
            Value::Number(n) => {
                let updated =
                    apply_modop(op, n, &rhs).map_err(|kind| RuntimeError::new(kind, s.span))?;
                *n = updated;
                Ok(())
            }
            Value::Array(_) => Err(RuntimeError::new(
                ErrorKind::Type(format!(
                    "Modification '{}' does not support arrays",
                    s.op.symbol()
                )),
                s.span,
            )),
        }
    }

    // ---------------- If / loop / for ----------------

    fn eval_if(&mut self, s: &IfStmt, direction: Direction) -> RuntimeResult<Flow> {
        if s.is_mono {
            // Forward only; no exit assertion for a monodirectional branch
            let entered = self.ctx().eval_truthy(&s.guard)?;
            let branch = if entered { &s.then_branch } else { &s.else_branch };
            return self.run_block(branch, Direction::Forward);
        }
        let (selector, check): (&Expr, Option<&Expr>) = match direction {
            Direction::Forward => (&s.guard, s.post.as_ref()),
            Direction::Reverse => match &s.post {
                Some(post) => (post, Some(&s.guard)),
                // Without a fi predicate the guard itself selects on the
                // post-state and there is nothing to verify afterwards
                None => (&s.guard, None),
            },
        };
        let entered = self.ctx().eval_truthy(selector)?;
        let branch = if entered { &s.then_branch } else { &s.else_branch };
        let flow = self.run_block(branch, direction)?;
        if let Some(check) = check {
            let exited = self.ctx().eval_truthy(check)?;
            if exited != entered {
                return Err(RuntimeError::new(
                    ErrorKind::Reversibility(
                        "The fi assertion gave a different result to the if condition"
                            .to_string(),
                    ),
                    s.span,
                ));
            }
        }
        Ok(flow)
    }

    fn eval_loop(&mut self, s: &LoopStmt, direction: Direction) -> RuntimeResult<Flow> {
        if s.is_mono {
            while self.ctx().eval_truthy(&s.entry)? {
                if let Flow::Caught = self.run_block(&s.body, Direction::Forward)? {
                    return Ok(Flow::Caught);
                }
            }
            return Ok(Flow::Normal);
        }
        let Some(exit) = s.exit.as_ref() else {
            // A loop without an exit predicate has no reverse reading
            if direction.is_reverse() {
                return Err(RuntimeError::new(
                    ErrorKind::Reversibility(
                        "A loop with an empty exit predicate cannot run in reverse".to_string(),
                    ),
                    s.span,
                ));
            }
            if !self.ctx().eval_truthy(&s.entry)? {
                return Err(RuntimeError::new(
                    ErrorKind::Reversibility(
                        "Loop entry predicate is false at loop entry".to_string(),
                    ),
                    s.span,
                ));
            }
            loop {
                if let Flow::Caught = self.run_block(&s.body, direction)? {
                    return Ok(Flow::Caught);
                }
                if !self.ctx().eval_truthy(&s.entry)? {
                    return Ok(Flow::Normal);
                }
            }
        };

        // Both directions require the exit predicate false at the state the
        // loop starts from; that is what lets reverse execution find it again.
        if self.ctx().eval_truthy(exit)? {
            return Err(RuntimeError::new(
                ErrorKind::Reversibility(
                    "Loop exit predicate is true before the loop starts".to_string(),
                ),
                exit.span(),
            ));
        }
        let entry_now = self.ctx().eval_truthy(&s.entry)?;
        match direction {
            Direction::Forward if !entry_now => {
                return Err(RuntimeError::new(
                    ErrorKind::Reversibility(
                        "Loop entry predicate is false at loop entry".to_string(),
                    ),
                    s.entry.span(),
                ));
            }
            Direction::Reverse if entry_now => {
                return Err(RuntimeError::new(
                    ErrorKind::Reversibility(
                        "Loop entry predicate is true at reverse loop entry".to_string(),
                    ),
                    s.entry.span(),
                ));
            }
            _ => {}
        }

        loop {
            if let Flow::Caught = self.run_block(&s.body, direction)? {
                return Ok(Flow::Caught);
            }
            let exit_now = self.ctx().eval_truthy(exit)?;
            let entry_now = self.ctx().eval_truthy(&s.entry)?;
            match direction {
                Direction::Forward => match (exit_now, entry_now) {
                    (true, true) => continue,
                    (false, false) => return Ok(Flow::Normal),
                    _ => {
                        return Err(RuntimeError::new(
                            ErrorKind::Reversibility(
                                "Loop entry and exit predicates disagree after an iteration"
                                    .to_string(),
                            ),
                            s.span,
                        ));
                    }
                },
                Direction::Reverse => {
                    if !entry_now {
                        return Err(RuntimeError::new(
                            ErrorKind::Reversibility(
                                "Loop entry predicate is false after a reversed iteration"
                                    .to_string(),
                            ),
                            s.span,
                        ));
                    }
                    if !exit_now {
                        // Reached the loop's original entry state
                        return Ok(Flow::Normal);
                    }
                }
            }
        }
    }

    fn eval_for(&mut self, s: &ForStmt, direction: Direction) -> RuntimeResult<Flow> {
        let iterated = self.ctx().eval(&s.iterator)?;
        let items = iterated
            .as_array()
            .map_err(|kind| RuntimeError::new(kind, s.iterator.span()))?
            .to_vec();
        let order: Vec<&Value> = match direction {
            Direction::Forward => items.iter().collect(),
            Direction::Reverse => items.iter().rev().collect(),
        };
        for element in order {
            let slot = Slot {
                cell: Arc::new(std::sync::Mutex::new(element.clone())),
                mono: is_mono_name(&s.name),
                borrowed: true,
            };
            self.frame
                .bind(&s.name, slot)
                .map_err(|kind| RuntimeError::new(kind, s.span))?;
            let flow = self.run_block(&s.body, direction)?;
            let slot = self
                .frame
                .remove(&s.name)
                .map_err(|kind| RuntimeError::new(kind, s.span))?;
            if !s.is_mono && slot.value() != *element {
                return Err(RuntimeError::new(
                    ErrorKind::Reversibility(format!(
                        "For loop variable '{}' has a different value to the iterator \
                         element after the block has run",
                        s.name
                    )),
                    s.span,
                ));
            }
            if let Flow::Caught = flow {
                return Ok(Flow::Caught);
            }
        }
        Ok(Flow::Normal)
    }

    // ---------------- Try / catch ----------------

    fn eval_try(&mut self, s: &TryStmt, direction: Direction) -> RuntimeResult<Flow> {
        match direction {
            Direction::Forward => {
                let range = self.ctx().eval(&s.iterator)?;
                let candidates = range
                    .as_array()
                    .map_err(|kind| RuntimeError::new(kind, s.iterator.span()))?
                    .to_vec();
                for candidate in candidates {
                    let snapshot = self.frame.snapshot();
                    self.frame
                        .bind(&s.name, Slot::owned(candidate, false))
                        .map_err(|kind| RuntimeError::new(kind, s.span))?;
                    if self.run_try_attempt(&s.body)? {
                        return Ok(Flow::Normal);
                    }
                    self.frame.restore(&snapshot);
                }
                Err(RuntimeError::new(
                    ErrorKind::TryExhausted(format!(
                        "No value of '{}' satisfied a catch",
                        s.name
                    )),
                    s.span,
                ))
            }
            Direction::Reverse => {
                if !self.frame.contains(&s.name) {
                    return Err(RuntimeError::new(
                        ErrorKind::Scope(format!(
                            "Try variable '{}' is not bound at reverse entry",
                            s.name
                        )),
                        s.span,
                    ));
                }
                // Statements after the catch that fired never ran forward;
                // find that catch on the post-state and undo the rest.
                let mut resume = None;
                for (idx, statement) in s.body.iter().enumerate().rev() {
                    if let Statement::Catch(c) = statement {
                        if self.ctx().eval_truthy(&c.predicate)? {
                            resume = Some(idx);
                            break;
                        }
                    }
                }
                let resume = resume.ok_or_else(|| {
                    RuntimeError::new(
                        ErrorKind::Reversibility(
                            "No catch predicate holds at the reverse entry of a try".to_string(),
                        ),
                        s.span,
                    )
                })?;
                for statement in s.body[..resume].iter().rev() {
                    self.eval_stmt(statement, Direction::Reverse)?;
                }
                self.frame
                    .remove(&s.name)
                    .map_err(|kind| RuntimeError::new(kind, s.span))?;
                Ok(Flow::Normal)
            }
        }
    }

    fn run_try_attempt(&mut self, body: &[Statement]) -> RuntimeResult<bool> {
        for statement in body {
            if let Flow::Caught = self.eval_stmt(statement, Direction::Forward)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ---------------- Do / yield / undo ----------------

    fn eval_do_undo(&mut self, s: &DoUndoStmt, direction: Direction) -> RuntimeResult<Flow> {
        if let Some(name) = self.frame.has_mono_binding() {
            return Err(RuntimeError::new(
                ErrorKind::Reversibility(format!(
                    "Changing the direction of time with monodirectional variable '{}' \
                     in scope",
                    name
                )),
                s.span,
            ));
        }
        self.run_block(&s.do_body, Direction::Forward)?;
        self.run_block(&s.yield_body, direction)?;
        if let Some(name) = self.frame.has_mono_binding() {
            return Err(RuntimeError::new(
                ErrorKind::Reversibility(format!(
                    "Monodirectional variable '{}' is still in scope at the end of a \
                     yield block",
                    name
                )),
                s.span,
            ));
        }
        self.run_block(&s.do_body, Direction::Reverse)?;
        Ok(Flow::Normal)
    }

    // ---------------- Calls ----------------

    fn eval_call(&mut self, s: &CallStmt, direction: Direction) -> RuntimeResult<()> {
        let uncall = s.is_uncall ^ direction.is_reverse();
        let func = self.registry.function(&s.func).cloned().ok_or_else(|| {
            RuntimeError::new(
                ErrorKind::Scope(format!("Function '{}' does not exist", s.func)),
                s.span,
            )
        })?;
        let def = Arc::clone(&func.def);
        if def.is_mono() && uncall {
            return Err(RuntimeError::new(
                ErrorKind::Scope(format!(
                    "Cannot uncall monodirectional function '{}'",
                    s.func
                )),
                s.span,
            ));
        }
        if def.borrow_params.len() != s.borrow_args.len() {
            return Err(RuntimeError::new(
                ErrorKind::Scope(format!(
                    "Function '{}' expects {} borrowed references but was given {}",
                    s.func,
                    def.borrow_params.len(),
                    s.borrow_args.len()
                )),
                s.span,
            ));
        }
        if def.inout_params.len() != s.inout_args.len() {
            return Err(RuntimeError::new(
                ErrorKind::Scope(format!(
                    "Function '{}' expects {} in-out references but was given {}",
                    s.func,
                    def.inout_params.len(),
                    s.inout_args.len()
                )),
                s.span,
            ));
        }

        let mut bindings = Vec::with_capacity(s.borrow_args.len() + s.inout_args.len());
        let args = s.borrow_args.iter().zip(def.borrow_params.iter());
        let inouts = s.inout_args.iter().zip(def.inout_params.iter());
        for (arg, param) in args.chain(inouts) {
            let slot = self.frame.get(&arg.name).ok_or_else(|| {
                RuntimeError::new(
                    ErrorKind::Scope(format!(
                        "Argument '{}' does not exist in the calling scope",
                        arg.name
                    )),
                    arg.span,
                )
            })?;
            if slot.mono != param.is_mono() {
                return Err(RuntimeError::new(
                    ErrorKind::Scope(format!(
                        "Calling '{}' with {} argument '{}' for {} parameter '{}'",
                        s.func,
                        if slot.mono { "mono" } else { "non-mono" },
                        arg.name,
                        if param.is_mono() { "mono" } else { "non-mono" },
                        param.name
                    )),
                    arg.span,
                ));
            }
            bindings.push((param.name.clone(), slot.alias()));
        }

        let body_direction = if uncall {
            Direction::Reverse
        } else {
            Direction::Forward
        };
        match &s.num_threads {
            None => {
                let mut callee = Frame::new();
                for (name, slot) in bindings {
                    callee
                        .bind(&name, slot)
                        .map_err(|kind| RuntimeError::new(kind, s.span))?;
                }
                let caller = std::mem::replace(&mut self.frame, callee);
                let result = self.run_function(&func, body_direction);
                self.frame = caller;
                result.map_err(|err| err.in_function(&def.name))
            }
            Some(threads) => {
                let count = self.thread_count(threads.as_ref(), s.span)?;
                self.run_parallel(&func, &bindings, body_direction, count, s.span)
            }
        }
    }

    fn thread_count(&self, expr: Option<&Expr>, span: Span) -> RuntimeResult<u32> {
        let count = match expr {
            None => return Ok(self.default_threads),
            Some(expr) => self.ctx().eval_number(expr)?,
        };
        if !count.is_integer() || !count.is_positive() {
            return Err(RuntimeError::new(
                ErrorKind::Type(format!(
                    "Thread count must be a positive integer, found {}",
                    Value::Number(count)
                )),
                span,
            ));
        }
        count.to_integer().to_u32().ok_or_else(|| {
            RuntimeError::new(
                ErrorKind::Type("Thread count is too large".to_string()),
                span,
            )
        })
    }

    /// Fans the call out over `count` OS threads. Worker frames alias the
    /// same caller-side cells, so shared mutation must be synchronized by
    /// the program via barriers and mutexes.
    fn run_parallel(
        &self,
        func: &RegisteredFunction,
        bindings: &[(String, Slot)],
        direction: Direction,
        count: u32,
        span: Span,
    ) -> RuntimeResult<()> {
        let group = Arc::new(SyncHub::new());
        let results: Vec<RuntimeResult<()>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..count)
                .map(|tid| {
                    let group = Arc::clone(&group);
                    let registry = Arc::clone(&self.registry);
                    let func = func.clone();
                    let bindings: Vec<(String, Slot)> = bindings
                        .iter()
                        .map(|(name, slot)| (name.clone(), slot.alias()))
                        .collect();
                    let default_threads = self.default_threads;
                    scope.spawn(move || {
                        let mut worker = Interpreter {
                            registry,
                            hub: Arc::clone(&group),
                            thread: ThreadContext { tid, count },
                            default_threads,
                            frame: Frame::new(),
                        };
                        for (name, slot) in bindings {
                            worker
                                .frame
                                .bind(&name, slot)
                                .map_err(|kind| RuntimeError::new(kind, span))?;
                        }
                        let result = worker.run_function(&func, direction);
                        if result.is_err() {
                            group.poison();
                        }
                        result
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("worker thread panicked"))
                .collect()
        });

        let mut sympathetic = None;
        for result in results {
            match result {
                Ok(()) => {}
                Err(err) if err.is_sympathetic() => sympathetic = Some(err),
                Err(err) => return Err(err.in_function(&func.def.name)),
            }
        }
        match sympathetic {
            Some(err) => Err(err.in_function(&func.def.name)),
            None => Ok(()),
        }
    }

    // ---------------- Print ----------------

    fn eval_print(&mut self, s: &PrintStmt) -> RuntimeResult<()> {
        let mut parts = Vec::with_capacity(s.args.len());
        for arg in &s.args {
            match arg {
                PrintArg::Text(text) => parts.push(text.clone()),
                PrintArg::Value(expr) => parts.push(self.ctx().eval(expr)?.to_string()),
            }
        }
        let line = parts.join(" ");
        if s.newline {
            println!("{}", line);
        } else {
            print!("{}", line);
        }
        Ok(())
    }

    // ---------------- Helpers ----------------

    /// The slot behind a mutable operation. Globals are read-only and never
    /// valid targets.
    fn local_slot(&self, name: &str, span: Span) -> RuntimeResult<Slot> {
        if let Some(slot) = self.frame.get(name) {
            return Ok(slot.clone());
        }
        if self.registry.globals.contains_key(name) {
            return Err(RuntimeError::new(
                ErrorKind::Scope(format!("Global '{}' is immutable", name)),
                span,
            ));
        }
        Err(RuntimeError::new(
            ErrorKind::Scope(format!("Variable '{}' is undefined", name)),
            span,
        ))
    }
}
