use std::fmt;

/// Expression nodes. Every construct in the language is an expression and
/// evaluates to a double; children are exclusively owned, so the AST is a
/// strict tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A numeric literal.
    Number(f64),
    /// A reference to a named variable.
    Variable(String),
    /// An application of a user-defined unary operator.
    Unary { op: char, operand: Box<Expr> },
    /// A binary operation, built-in or user-defined.
    Binary {
        op: char,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// A call to a named function.
    Call { callee: String, args: Vec<Expr> },
    /// An if/then/else conditional; the branch taken supplies the value.
    If {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    /// A for loop over a mutable induction variable. The step is always
    /// present; the parser materializes the literal 1.0 when it is omitted.
    For {
        var: String,
        start: Box<Expr>,
        end: Box<Expr>,
        step: Box<Expr>,
        body: Box<Expr>,
    },
    /// `var`/`in` bindings scoped to the body. Omitted initializers are
    /// materialized as the literal 0.0 by the parser.
    VarIn {
        bindings: Vec<(String, Expr)>,
        body: Box<Expr>,
    },
}

/// A function signature: its name plus the ordered parameter names. Operator
/// prototypes are named by convention (`"unary" + char`, `"binary" + char`),
/// which is also the name the code generator resolves when it meets an
/// operator with no built-in form.
#[derive(Debug, Clone, PartialEq)]
pub struct Prototype {
    pub name: String,
    pub params: Vec<String>,
    pub kind: PrototypeKind,
}

/// What a prototype declares.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrototypeKind {
    /// An ordinary named function.
    Function,
    /// A user-defined unary operator; exactly one parameter.
    UnaryOp(char),
    /// A user-defined binary operator with its parse precedence; exactly two
    /// parameters.
    BinaryOp { op: char, precedence: u32 },
}

/// A function definition: exactly one prototype and one body expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub proto: Prototype,
    pub body: Expr,
}

/// One top-level unit as produced by the parser.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// A `def` function definition.
    Definition(Function),
    /// An `extern` declaration.
    Extern(Prototype),
    /// A bare top-level expression, wrapped into an anonymous zero-argument
    /// definition.
    Expression(Function),
}

impl fmt::Display for Expr {
    /// Renders the tree as a single-line s-expression; used by tests to pin
    /// down associativity and defaulted sub-expressions.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(value) => write!(f, "{}", value),
            Expr::Variable(name) => write!(f, "{}", name),
            Expr::Unary { op, operand } => write!(f, "({} {})", op, operand),
            Expr::Binary { op, lhs, rhs } => write!(f, "({} {} {})", op, lhs, rhs),
            Expr::Call { callee, args } => {
                write!(f, "({}", callee)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                write!(f, ")")
            }
            Expr::If {
                cond,
                then_expr,
                else_expr,
            } => write!(f, "(if {} {} {})", cond, then_expr, else_expr),
            Expr::For {
                var,
                start,
                end,
                step,
                body,
            } => write!(f, "(for {} {} {} {} {})", var, start, end, step, body),
            Expr::VarIn { bindings, body } => {
                write!(f, "(var (")?;
                for (i, (name, init)) in bindings.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "({} {})", name, init)?;
                }
                write!(f, ") {})", body)
            }
        }
    }
}
