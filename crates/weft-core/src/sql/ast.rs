//! Owned statement tree for analyzed SELECTs.
//!
//! The lowering in this module's sibling turns `sqlparser`'s AST into a
//! tree with exactly the structure lineage and lint need, every node
//! carrying an immutable 1-based [`Position`]. Expressions below the
//! projection level are not fully reified: an [`SqlExpr`] keeps the
//! rendered source plus the column references and subqueries found
//! inside it, which is all downstream analysis consumes.

use crate::types::Position;

/// A parsed SELECT statement, including its WITH clause and set
/// operations.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStmt {
    pub with: Vec<CteDef>,
    pub body: QueryBody,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub position: Position,
}

impl SelectStmt {
    /// The leftmost SELECT core, which determines the output column
    /// list under SQL set-operation semantics.
    pub fn first_core(&self) -> &SelectCore {
        self.body.first_core()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryBody {
    Select(Box<SelectCore>),
    SetOp(Box<SetOp>),
}

impl QueryBody {
    pub fn first_core(&self) -> &SelectCore {
        match self {
            QueryBody::Select(core) => core,
            QueryBody::SetOp(op) => op.left.first_core(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetOp {
    pub op: SetOperator,
    pub all: bool,
    pub left: QueryBody,
    pub right: QueryBody,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperator {
    Union,
    Intersect,
    Except,
}

/// One SELECT core: projection, sources and filters.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectCore {
    pub projection: Vec<SelectItem>,
    pub from: Vec<FromItem>,
    pub where_clause: Option<SqlExpr>,
    pub group_by: Vec<SqlExpr>,
    pub having: Option<SqlExpr>,
    pub position: Position,
}

/// A FROM-list entry: a relation plus the joins chained onto it.
#[derive(Debug, Clone, PartialEq)]
pub struct FromItem {
    pub relation: TableRef,
    pub joins: Vec<Join>,
}

/// A table reference: a named relation or a derived subquery.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    /// Dotted name with quoting stripped; empty for anonymous derived
    /// tables.
    pub name: String,
    pub alias: Option<String>,
    pub subquery: Option<Box<SelectStmt>>,
    pub position: Position,
}

impl TableRef {
    /// The name this relation binds in the enclosing scope.
    pub fn binding_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub relation: TableRef,
    pub kind: JoinKind,
    pub condition: Option<SqlExpr>,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

/// One item of the SELECT projection.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*` or `t.*`.
    Star {
        qualifier: Option<String>,
        position: Position,
    },
    /// A bare or qualified column reference.
    Column {
        table: Option<String>,
        column: String,
        alias: Option<String>,
        position: Position,
    },
    /// Any other expression.
    Expression {
        /// Outermost function name, lowercased, when the expression is
        /// a single function call.
        function: Option<String>,
        expr: SqlExpr,
        alias: Option<String>,
        position: Position,
    },
}

impl SelectItem {
    pub fn position(&self) -> Position {
        match self {
            SelectItem::Star { position, .. }
            | SelectItem::Column { position, .. }
            | SelectItem::Expression { position, .. } => *position,
        }
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            SelectItem::Star { .. } => None,
            SelectItem::Column { alias, .. } | SelectItem::Expression { alias, .. } => {
                alias.as_deref()
            }
        }
    }
}

/// An opaque expression with its analyzable contents extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlExpr {
    /// Rendered source of the expression.
    pub raw: String,
    /// Column references appearing anywhere in the expression, outside
    /// of nested subqueries.
    pub column_refs: Vec<ColumnRefExpr>,
    /// Scalar subqueries nested in the expression.
    pub subqueries: Vec<SelectStmt>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRefExpr {
    pub table: Option<String>,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub expr: SqlExpr,
    pub ascending: Option<bool>,
}

/// A named subquery from the WITH clause.
#[derive(Debug, Clone, PartialEq)]
pub struct CteDef {
    pub name: String,
    /// Declared column aliases, when present.
    pub columns: Vec<String>,
    pub query: SelectStmt,
    pub position: Position,
}
