use crate::language::span::Span;
use num_rational::BigRational;
use std::path::PathBuf;

pub fn is_mono_name(name: &str) -> bool {
    name.starts_with('.')
}

#[derive(Clone, Debug)]
pub struct Module {
    pub name: String,
    pub path: PathBuf,
    pub imports: Vec<Import>,
    pub globals: Vec<GlobalDef>,
    pub functions: Vec<FunctionDef>,
}

#[derive(Clone, Debug)]
pub struct Import {
    pub path: String,
    pub alias: Option<String>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct GlobalDef {
    pub name: String,
    pub value: Expr,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct FunctionDef {
    pub name: String,
    pub borrow_params: Vec<Param>,
    pub inout_params: Vec<Param>,
    pub body: Vec<Statement>,
    pub span: Span,
}

impl FunctionDef {
    pub fn is_mono(&self) -> bool {
        is_mono_name(&self.name)
    }
}

#[derive(Clone, Debug)]
pub struct Param {
    pub name: String,
    pub span: Span,
}

impl Param {
    pub fn is_mono(&self) -> bool {
        is_mono_name(&self.name)
    }
}

/// A variable reference with an optional chain of index expressions.
#[derive(Clone, Debug)]
pub struct Lookup {
    pub name: String,
    pub index: Vec<Expr>,
    pub span: Span,
}

impl Lookup {
    pub fn is_mono(&self) -> bool {
        is_mono_name(&self.name)
    }
}

#[derive(Clone, Debug)]
pub enum Statement {
    Let(LetStmt),
    Unlet(LetStmt),
    Push(StackStmt),
    Pop(StackStmt),
    Swap(SwapStmt),
    Promote(PromoteStmt),
    Modop(ModopStmt),
    If(IfStmt),
    Loop(LoopStmt),
    For(ForStmt),
    Try(TryStmt),
    Catch(CatchStmt),
    DoUndo(DoUndoStmt),
    Barrier(BarrierStmt),
    Mutex(MutexStmt),
    Call(CallStmt),
    Print(PrintStmt),
}

impl Statement {
    pub fn span(&self) -> Span {
        match self {
            Statement::Let(s) | Statement::Unlet(s) => s.span,
            Statement::Push(s) | Statement::Pop(s) => s.span,
            Statement::Swap(s) => s.span,
            Statement::Promote(s) => s.span,
            Statement::Modop(s) => s.span,
            Statement::If(s) => s.span,
            Statement::Loop(s) => s.span,
            Statement::For(s) => s.span,
            Statement::Try(s) => s.span,
            Statement::Catch(s) => s.span,
            Statement::DoUndo(s) => s.span,
            Statement::Barrier(s) => s.span,
            Statement::Mutex(s) => s.span,
            Statement::Call(s) => s.span,
            Statement::Print(s) => s.span,
        }
    }

    /// Monodirectional statements run only under forward execution.
    pub fn is_mono(&self) -> bool {
        match self {
            Statement::Let(s) | Statement::Unlet(s) => s.is_mono,
            Statement::Push(s) | Statement::Pop(s) => s.is_mono,
            Statement::Swap(s) => s.is_mono,
            Statement::Modop(s) => s.is_mono,
            Statement::If(s) => s.is_mono,
            Statement::Loop(s) => s.is_mono,
            Statement::For(s) => s.is_mono,
            Statement::Call(s) => is_mono_name(&s.func),
            Statement::Promote(_)
            | Statement::Try(_)
            | Statement::Catch(_)
            | Statement::DoUndo(_)
            | Statement::Barrier(_)
            | Statement::Mutex(_)
            | Statement::Print(_) => false,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Statement::Let(_) => "let",
            Statement::Unlet(_) => "unlet",
            Statement::Push(_) => "push",
            Statement::Pop(_) => "pop",
            Statement::Swap(_) => "swap",
            Statement::Promote(_) => "promote",
            Statement::Modop(_) => "modification",
            Statement::If(_) => "if",
            Statement::Loop(_) => "loop",
            Statement::For(_) => "for",
            Statement::Try(_) => "try",
            Statement::Catch(_) => "catch",
            Statement::DoUndo(_) => "do-yield-undo",
            Statement::Barrier(_) => "barrier",
            Statement::Mutex(_) => "mutex",
            Statement::Call(_) => "call",
            Statement::Print(_) => "print",
        }
    }
}

#[derive(Clone, Debug)]
pub struct LetStmt {
    pub name: String,
    pub rhs: Option<Expr>,
    pub is_mono: bool,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct StackStmt {
    /// The value variable: consumed by push, created by pop.
    pub name: String,
    pub stack: Lookup,
    pub is_mono: bool,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct SwapStmt {
    pub left: Lookup,
    pub right: Lookup,
    pub is_mono: bool,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct PromoteStmt {
    pub src: String,
    pub dst: String,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct ModopStmt {
    pub lookup: Lookup,
    pub op: ModOp,
    pub rhs: Expr,
    pub is_mono: bool,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Pow,
    Rem,
    Xor,
    Or,
    And,
}

impl ModOp {
    pub fn inverse(self) -> Option<ModOp> {
        match self {
            ModOp::Add => Some(ModOp::Sub),
            ModOp::Sub => Some(ModOp::Add),
            ModOp::Mul => Some(ModOp::Div),
            ModOp::Div => Some(ModOp::Mul),
            ModOp::Xor => Some(ModOp::Xor),
            ModOp::FloorDiv | ModOp::Pow | ModOp::Rem | ModOp::Or | ModOp::And => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ModOp::Add => "+=",
            ModOp::Sub => "-=",
            ModOp::Mul => "*=",
            ModOp::Div => "/=",
            ModOp::FloorDiv => "//=",
            ModOp::Pow => "**=",
            ModOp::Rem => "%=",
            ModOp::Xor => "^=",
            ModOp::Or => "|=",
            ModOp::And => "&=",
        }
    }
}

#[derive(Clone, Debug)]
pub struct IfStmt {
    pub guard: Expr,
    pub then_branch: Vec<Statement>,
    pub else_branch: Vec<Statement>,
    /// The fi(..) predicate; None means the parser saw a bare `fi`.
    pub post: Option<Expr>,
    pub is_mono: bool,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct LoopStmt {
    pub entry: Expr,
    pub body: Vec<Statement>,
    /// The pool(..) predicate; None means a bare `pool` (same as entry).
    pub exit: Option<Expr>,
    pub is_mono: bool,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct ForStmt {
    pub name: String,
    pub iterator: Expr,
    pub body: Vec<Statement>,
    pub is_mono: bool,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct TryStmt {
    pub name: String,
    pub iterator: Expr,
    pub body: Vec<Statement>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct CatchStmt {
    pub predicate: Expr,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct DoUndoStmt {
    pub do_body: Vec<Statement>,
    pub yield_body: Vec<Statement>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct BarrierStmt {
    pub name: String,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct MutexStmt {
    pub name: String,
    pub body: Vec<Statement>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct CallStmt {
    pub is_uncall: bool,
    pub func: String,
    /// None: serial call. Some(None): `{}`, the default pool size.
    /// Some(Some(expr)): `{expr}` threads.
    pub num_threads: Option<Option<Expr>>,
    pub borrow_args: Vec<Param>,
    pub inout_args: Vec<Param>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct PrintStmt {
    pub newline: bool,
    pub args: Vec<PrintArg>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum PrintArg {
    Text(String),
    Value(Expr),
}

#[derive(Clone, Debug)]
pub enum Expr {
    Number(NumberLit),
    Lookup(Lookup),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnOp,
        expr: Box<Expr>,
        span: Span,
    },
    Length(Lookup, Span),
    ArrayLiteral(Vec<Expr>, Span),
    ArrayRange {
        start: Box<Expr>,
        stop: Box<Expr>,
        step: Option<Box<Expr>>,
        span: Span,
    },
    ArrayTensor {
        fill: Box<Expr>,
        shape: Box<Expr>,
        span: Span,
    },
    ThreadId(Span),
    NumThreads(Span),
}

#[derive(Clone, Debug)]
pub struct NumberLit {
    pub value: BigRational,
    pub span: Span,
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Number(lit) => lit.span,
            Expr::Lookup(lookup) => lookup.span,
            Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::ArrayRange { span, .. }
            | Expr::ArrayTensor { span, .. } => *span,
            Expr::Length(_, span)
            | Expr::ArrayLiteral(_, span)
            | Expr::ThreadId(span)
            | Expr::NumThreads(span) => *span,
        }
    }

    /// True if the expression reads any monodirectional name.
    pub fn has_mono(&self) -> bool {
        match self {
            Expr::Number(_) | Expr::ThreadId(_) | Expr::NumThreads(_) => false,
            Expr::Lookup(lookup) => lookup.is_mono() || lookup.index.iter().any(Expr::has_mono),
            Expr::Binary { left, right, .. } => left.has_mono() || right.has_mono(),
            Expr::Unary { expr, .. } => expr.has_mono(),
            Expr::Length(lookup, _) => {
                lookup.is_mono() || lookup.index.iter().any(Expr::has_mono)
            }
            Expr::ArrayLiteral(items, _) => items.iter().any(Expr::has_mono),
            Expr::ArrayRange {
                start, stop, step, ..
            } => {
                start.has_mono()
                    || stop.has_mono()
                    || step.as_ref().map(|e| e.has_mono()).unwrap_or(false)
            }
            Expr::ArrayTensor { fill, shape, .. } => fill.has_mono() || shape.has_mono(),
        }
    }

    /// True if the expression reads the named variable, anywhere, including
    /// inside index expressions.
    pub fn uses_name(&self, name: &str) -> bool {
        match self {
            Expr::Number(_) | Expr::ThreadId(_) | Expr::NumThreads(_) => false,
            Expr::Lookup(lookup) => {
                lookup.name == name || lookup.index.iter().any(|e| e.uses_name(name))
            }
            Expr::Binary { left, right, .. } => left.uses_name(name) || right.uses_name(name),
            Expr::Unary { expr, .. } => expr.uses_name(name),
            Expr::Length(lookup, _) => {
                lookup.name == name || lookup.index.iter().any(|e| e.uses_name(name))
            }
            Expr::ArrayLiteral(items, _) => items.iter().any(|e| e.uses_name(name)),
            Expr::ArrayRange {
                start, stop, step, ..
            } => {
                start.uses_name(name)
                    || stop.uses_name(name)
                    || step.as_ref().map(|e| e.uses_name(name)).unwrap_or(false)
            }
            Expr::ArrayTensor { fill, shape, .. } => {
                fill.uses_name(name) || shape.uses_name(name)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Pow,
    Rem,
    Xor,
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Pow => "**",
            BinOp::Rem => "%",
            BinOp::Xor => "^",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::Lt => "<",
            BinOp::LtEq => "<=",
            BinOp::Gt => ">",
            BinOp::GtEq => ">=",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}
