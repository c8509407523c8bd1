//! Lowering from the `sqlparser` AST into the owned statement tree.

use super::ast::*;
use super::SqlError;
use crate::template::EXPR_PLACEHOLDER;
use crate::types::Position;
use sqlparser::ast::{self, Spanned};

pub(crate) fn lower_query(query: &ast::Query) -> Result<SelectStmt, SqlError> {
    let with = match &query.with {
        Some(with) => with
            .cte_tables
            .iter()
            .map(lower_cte)
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    let body = lower_set_expr(&query.body)?;

    let mut order_by = Vec::new();
    if let Some(clause) = &query.order_by {
        if let ast::OrderByKind::Expressions(exprs) = &clause.kind {
            for item in exprs {
                order_by.push(OrderByItem {
                    expr: lower_expr(&item.expr),
                    ascending: item.options.asc,
                });
            }
        }
    }

    let (limit, offset) = lower_limit_clause(query);

    Ok(SelectStmt {
        with,
        body,
        order_by,
        limit,
        offset,
        position: position_of(query.span()),
    })
}

fn lower_limit_clause(query: &ast::Query) -> (Option<String>, Option<String>) {
    match &query.limit_clause {
        Some(ast::LimitClause::LimitOffset { limit, offset, .. }) => (
            limit.as_ref().map(|e| e.to_string()),
            offset.as_ref().map(|o| o.value.to_string()),
        ),
        Some(ast::LimitClause::OffsetCommaLimit { offset, limit }) => {
            (Some(limit.to_string()), Some(offset.to_string()))
        }
        None => (None, None),
    }
}

fn lower_cte(cte: &ast::Cte) -> Result<CteDef, SqlError> {
    Ok(CteDef {
        name: cte.alias.name.value.clone(),
        columns: cte
            .alias
            .columns
            .iter()
            .map(|c| c.name.value.clone())
            .collect(),
        query: lower_query(&cte.query)?,
        position: ident_position(&cte.alias.name),
    })
}

fn lower_set_expr(set_expr: &ast::SetExpr) -> Result<QueryBody, SqlError> {
    match set_expr {
        ast::SetExpr::Select(select) => Ok(QueryBody::Select(Box::new(lower_select(select)?))),
        ast::SetExpr::Query(query) => Ok(lower_query(query)?.body),
        ast::SetExpr::SetOperation {
            op,
            set_quantifier,
            left,
            right,
        } => Ok(QueryBody::SetOp(Box::new(SetOp {
            op: match op {
                ast::SetOperator::Union => SetOperator::Union,
                ast::SetOperator::Intersect => SetOperator::Intersect,
                ast::SetOperator::Except => SetOperator::Except,
                ast::SetOperator::Minus => SetOperator::Except,
            },
            all: matches!(set_quantifier, ast::SetQuantifier::All),
            left: lower_set_expr(left)?,
            right: lower_set_expr(right)?,
            position: position_of(set_expr.span()),
        }))),
        other => Err(SqlError::at(
            "only SELECT bodies are supported in model statements",
            position_of(other.span()),
        )),
    }
}

fn lower_select(select: &ast::Select) -> Result<SelectCore, SqlError> {
    let position = position_of(select.span());

    let mut projection = Vec::with_capacity(select.projection.len());
    for item in &select.projection {
        projection.push(lower_select_item(item, position)?);
    }

    let mut from = Vec::with_capacity(select.from.len());
    for table_with_joins in &select.from {
        from.push(lower_table_with_joins(table_with_joins)?);
    }

    let where_clause = select.selection.as_ref().map(lower_expr);
    let having = select.having.as_ref().map(lower_expr);

    let group_by = match &select.group_by {
        ast::GroupByExpr::Expressions(exprs, _) => exprs.iter().map(lower_expr).collect(),
        ast::GroupByExpr::All(_) => Vec::new(),
    };

    Ok(SelectCore {
        projection,
        from,
        where_clause,
        group_by,
        having,
        position,
    })
}

fn lower_select_item(
    item: &ast::SelectItem,
    fallback: Position,
) -> Result<SelectItem, SqlError> {
    match item {
        ast::SelectItem::Wildcard(_) => Ok(SelectItem::Star {
            qualifier: None,
            position: fallback,
        }),
        ast::SelectItem::QualifiedWildcard(kind, _) => {
            let qualifier = match kind {
                ast::SelectItemQualifiedWildcardKind::ObjectName(name) => {
                    Some(object_name_text(name))
                }
                ast::SelectItemQualifiedWildcardKind::Expr(_) => None,
            };
            Ok(SelectItem::Star {
                qualifier,
                position: fallback,
            })
        }
        ast::SelectItem::UnnamedExpr(expr) => Ok(lower_projection_expr(expr, None, fallback)),
        ast::SelectItem::ExprWithAlias { expr, alias } => Ok(lower_projection_expr(
            expr,
            Some(alias.value.clone()),
            fallback,
        )),
    }
}

fn lower_projection_expr(
    expr: &ast::Expr,
    alias: Option<String>,
    fallback: Position,
) -> SelectItem {
    let position = expr_position(expr).unwrap_or(fallback);
    match expr {
        // A template placeholder is an opaque expression, never a
        // column of the source tables.
        ast::Expr::Identifier(ident) if ident.value == EXPR_PLACEHOLDER => {
            SelectItem::Expression {
                function: None,
                expr: SqlExpr {
                    raw: EXPR_PLACEHOLDER.to_string(),
                    column_refs: Vec::new(),
                    subqueries: Vec::new(),
                    position,
                },
                alias,
                position,
            }
        }
        ast::Expr::Identifier(ident) => SelectItem::Column {
            table: None,
            column: ident.value.clone(),
            alias,
            position,
        },
        ast::Expr::CompoundIdentifier(parts) if parts.len() >= 2 => SelectItem::Column {
            table: Some(
                parts[..parts.len() - 1]
                    .iter()
                    .map(|p| p.value.clone())
                    .collect::<Vec<_>>()
                    .join("."),
            ),
            column: parts[parts.len() - 1].value.clone(),
            alias,
            position,
        },
        _ => {
            let function = match expr {
                ast::Expr::Function(func) => Some(function_name(&func.name)),
                _ => None,
            };
            SelectItem::Expression {
                function,
                expr: lower_expr(expr),
                alias,
                position,
            }
        }
    }
}

fn lower_table_with_joins(twj: &ast::TableWithJoins) -> Result<FromItem, SqlError> {
    let (relation, mut joins) = lower_table_factor(&twj.relation)?;
    for join in &twj.joins {
        joins.push(lower_join(join)?);
    }
    Ok(FromItem { relation, joins })
}

fn lower_join(join: &ast::Join) -> Result<Join, SqlError> {
    let (relation, _) = lower_table_factor(&join.relation)?;
    let (kind, condition) = lower_join_operator(&join.join_operator);
    Ok(Join {
        position: relation.position,
        relation,
        kind,
        condition,
    })
}

fn lower_join_operator(op: &ast::JoinOperator) -> (JoinKind, Option<SqlExpr>) {
    use ast::JoinOperator as J;
    match op {
        J::Join(c) | J::Inner(c) => (JoinKind::Inner, lower_join_constraint(c)),
        J::Left(c) | J::LeftOuter(c) => (JoinKind::Left, lower_join_constraint(c)),
        J::Right(c) | J::RightOuter(c) => (JoinKind::Right, lower_join_constraint(c)),
        J::FullOuter(c) => (JoinKind::Full, lower_join_constraint(c)),
        J::CrossJoin(_) => (JoinKind::Cross, None),
        _ => (JoinKind::Inner, None),
    }
}

fn lower_join_constraint(constraint: &ast::JoinConstraint) -> Option<SqlExpr> {
    match constraint {
        ast::JoinConstraint::On(expr) => Some(lower_expr(expr)),
        ast::JoinConstraint::Using(columns) => {
            let refs = columns
                .iter()
                .map(|c| ColumnRefExpr {
                    table: None,
                    column: c.to_string(),
                })
                .collect::<Vec<_>>();
            let raw = format!(
                "USING ({})",
                columns
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            Some(SqlExpr {
                raw,
                column_refs: refs,
                subqueries: Vec::new(),
                position: Position::start(),
            })
        }
        _ => None,
    }
}

fn lower_table_factor(factor: &ast::TableFactor) -> Result<(TableRef, Vec<Join>), SqlError> {
    match factor {
        ast::TableFactor::Table { name, alias, .. } => {
            let position = name
                .0
                .first()
                .map(|part| position_of(part.span()))
                .unwrap_or_else(Position::start);
            Ok((
                TableRef {
                    name: object_name_text(name),
                    alias: alias.as_ref().map(|a| a.name.value.clone()),
                    subquery: None,
                    position,
                },
                Vec::new(),
            ))
        }
        ast::TableFactor::Derived {
            subquery, alias, ..
        } => {
            let lowered = lower_query(subquery)?;
            let position = lowered.position;
            Ok((
                TableRef {
                    name: alias
                        .as_ref()
                        .map(|a| a.name.value.clone())
                        .unwrap_or_default(),
                    alias: alias.as_ref().map(|a| a.name.value.clone()),
                    subquery: Some(Box::new(lowered)),
                    position,
                },
                Vec::new(),
            ))
        }
        ast::TableFactor::NestedJoin {
            table_with_joins, ..
        } => {
            let item = lower_table_with_joins(table_with_joins)?;
            Ok((item.relation, item.joins))
        }
        other => Ok((
            TableRef {
                name: String::new(),
                alias: None,
                subquery: None,
                position: position_of(other.span()),
            },
            Vec::new(),
        )),
    }
}

/// Lowers an expression into its opaque form, extracting column
/// references and nested subqueries.
fn lower_expr(expr: &ast::Expr) -> SqlExpr {
    let mut refs = Vec::new();
    let mut subqueries = Vec::new();
    collect_refs(expr, &mut refs, &mut subqueries);
    SqlExpr {
        raw: expr.to_string(),
        column_refs: refs,
        subqueries,
        position: expr_position(expr).unwrap_or_else(Position::start),
    }
}

fn collect_refs(
    expr: &ast::Expr,
    refs: &mut Vec<ColumnRefExpr>,
    subqueries: &mut Vec<SelectStmt>,
) {
    use ast::Expr as E;
    match expr {
        E::Identifier(ident) => {
            if ident.value != EXPR_PLACEHOLDER {
                refs.push(ColumnRefExpr {
                    table: None,
                    column: ident.value.clone(),
                });
            }
        }
        E::CompoundIdentifier(parts) if parts.len() >= 2 => {
            refs.push(ColumnRefExpr {
                table: Some(
                    parts[..parts.len() - 1]
                        .iter()
                        .map(|p| p.value.clone())
                        .collect::<Vec<_>>()
                        .join("."),
                ),
                column: parts[parts.len() - 1].value.clone(),
            });
        }
        E::BinaryOp { left, right, .. } => {
            collect_refs(left, refs, subqueries);
            collect_refs(right, refs, subqueries);
        }
        E::UnaryOp { expr, .. } | E::Nested(expr) | E::Cast { expr, .. } => {
            collect_refs(expr, refs, subqueries);
        }
        E::IsNull(e)
        | E::IsNotNull(e)
        | E::IsTrue(e)
        | E::IsNotTrue(e)
        | E::IsFalse(e)
        | E::IsNotFalse(e) => collect_refs(e, refs, subqueries),
        E::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            if let Some(op) = operand {
                collect_refs(op, refs, subqueries);
            }
            for when in conditions {
                collect_refs(&when.condition, refs, subqueries);
                collect_refs(&when.result, refs, subqueries);
            }
            if let Some(e) = else_result {
                collect_refs(e, refs, subqueries);
            }
        }
        E::Function(func) => {
            if let ast::FunctionArguments::List(args) = &func.args {
                for arg in &args.args {
                    match arg {
                        ast::FunctionArg::Unnamed(ast::FunctionArgExpr::Expr(e))
                        | ast::FunctionArg::Named {
                            arg: ast::FunctionArgExpr::Expr(e),
                            ..
                        } => collect_refs(e, refs, subqueries),
                        _ => {}
                    }
                }
            }
        }
        E::InList { expr, list, .. } => {
            collect_refs(expr, refs, subqueries);
            for item in list {
                collect_refs(item, refs, subqueries);
            }
        }
        E::Between {
            expr, low, high, ..
        } => {
            collect_refs(expr, refs, subqueries);
            collect_refs(low, refs, subqueries);
            collect_refs(high, refs, subqueries);
        }
        E::Like { expr, pattern, .. }
        | E::ILike { expr, pattern, .. }
        | E::SimilarTo { expr, pattern, .. } => {
            collect_refs(expr, refs, subqueries);
            collect_refs(pattern, refs, subqueries);
        }
        E::Tuple(exprs) => {
            for e in exprs {
                collect_refs(e, refs, subqueries);
            }
        }
        E::Extract { expr, .. } => collect_refs(expr, refs, subqueries),
        E::InSubquery { expr, subquery, .. } => {
            collect_refs(expr, refs, subqueries);
            if let Ok(stmt) = lower_query(subquery) {
                subqueries.push(stmt);
            }
        }
        E::Subquery(query) => {
            if let Ok(stmt) = lower_query(query) {
                subqueries.push(stmt);
            }
        }
        E::Exists { subquery, .. } => {
            if let Ok(stmt) = lower_query(subquery) {
                subqueries.push(stmt);
            }
        }
        _ => {}
    }
}

fn function_name(name: &ast::ObjectName) -> String {
    name.0
        .last()
        .and_then(|part| part.as_ident())
        .map(|ident| ident.value.to_lowercase())
        .unwrap_or_else(|| name.to_string().to_lowercase())
}

/// Renders a dotted object name with quoting stripped.
fn object_name_text(name: &ast::ObjectName) -> String {
    name.0
        .iter()
        .map(|part| match part.as_ident() {
            Some(ident) => ident.value.clone(),
            None => part.to_string(),
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn ident_position(ident: &ast::Ident) -> Position {
    position_of(ident.span)
}

fn expr_position(expr: &ast::Expr) -> Option<Position> {
    let span = expr.span();
    if span.start.line > 0 && span.start.column > 0 {
        Some(Position::new(span.start.line as u32, span.start.column as u32))
    } else {
        None
    }
}

fn position_of(span: sqlparser::tokenizer::Span) -> Position {
    if span.start.line > 0 && span.start.column > 0 {
        Position::new(span.start.line as u32, span.start.column as u32)
    } else {
        Position::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::sql::parse_select;

    fn lower(sql: &str) -> SelectStmt {
        parse_select(sql, Dialect::Generic).unwrap().unwrap()
    }

    #[test]
    fn lowers_projection_kinds() {
        let stmt = lower("SELECT id, u.name, UPPER(email) AS e, 1 + 2 FROM users u");
        let core = stmt.first_core();
        assert!(matches!(
            &core.projection[0],
            SelectItem::Column { table: None, column, .. } if column == "id"
        ));
        assert!(matches!(
            &core.projection[1],
            SelectItem::Column { table: Some(t), column, .. } if t == "u" && column == "name"
        ));
        match &core.projection[2] {
            SelectItem::Expression {
                function, alias, expr, ..
            } => {
                assert_eq!(function.as_deref(), Some("upper"));
                assert_eq!(alias.as_deref(), Some("e"));
                assert_eq!(
                    expr.column_refs,
                    vec![ColumnRefExpr {
                        table: None,
                        column: "email".into()
                    }]
                );
            }
            other => panic!("expected expression, got {other:?}"),
        }
        assert!(matches!(
            &core.projection[3],
            SelectItem::Expression { function: None, .. }
        ));
    }

    #[test]
    fn lowers_ctes_in_order() {
        let stmt = lower("WITH a AS (SELECT 1), b (x) AS (SELECT 2) SELECT * FROM b");
        assert_eq!(stmt.with.len(), 2);
        assert_eq!(stmt.with[0].name, "a");
        assert_eq!(stmt.with[1].name, "b");
        assert_eq!(stmt.with[1].columns, vec!["x"]);
    }

    #[test]
    fn lowers_joins_with_conditions() {
        let stmt = lower(
            "SELECT * FROM a LEFT JOIN b ON a.id = b.a_id CROSS JOIN c",
        );
        let from = &stmt.first_core().from[0];
        assert_eq!(from.joins.len(), 2);
        assert_eq!(from.joins[0].kind, JoinKind::Left);
        let cond = from.joins[0].condition.as_ref().unwrap();
        assert_eq!(cond.column_refs.len(), 2);
        assert_eq!(from.joins[1].kind, JoinKind::Cross);
    }

    #[test]
    fn lowers_set_operation() {
        let stmt = lower("SELECT id FROM a UNION ALL SELECT id FROM b");
        match &stmt.body {
            QueryBody::SetOp(op) => {
                assert_eq!(op.op, SetOperator::Union);
                assert!(op.all);
            }
            other => panic!("expected set op, got {other:?}"),
        }
        // The leftmost core defines the column list.
        assert_eq!(stmt.first_core().from[0].relation.name, "a");
    }

    #[test]
    fn lowers_derived_table() {
        let stmt = lower("SELECT x FROM (SELECT id AS x FROM t) d");
        let relation = &stmt.first_core().from[0].relation;
        assert_eq!(relation.binding_name(), "d");
        assert!(relation.subquery.is_some());
    }

    #[test]
    fn where_subquery_is_collected() {
        let stmt = lower("SELECT id FROM a WHERE id IN (SELECT a_id FROM b)");
        let where_clause = stmt.first_core().where_clause.as_ref().unwrap();
        assert_eq!(where_clause.subqueries.len(), 1);
        assert_eq!(
            where_clause.subqueries[0].first_core().from[0].relation.name,
            "b"
        );
    }

    #[test]
    fn placeholder_identifier_is_an_opaque_expression() {
        let stmt = lower("SELECT __EXPR__ FROM users");
        match &stmt.first_core().projection[0] {
            SelectItem::Expression { expr, function, .. } => {
                assert!(function.is_none());
                assert!(expr.column_refs.is_empty());
            }
            other => panic!("expected expression, got {other:?}"),
        }
    }

    #[test]
    fn limit_and_offset_are_lowered() {
        let stmt = lower("SELECT id FROM t LIMIT 10 OFFSET 5");
        assert_eq!(stmt.limit.as_deref(), Some("10"));
        assert_eq!(stmt.offset.as_deref(), Some("5"));
    }

    #[test]
    fn order_by_direction() {
        let stmt = lower("SELECT id FROM t ORDER BY id DESC, name");
        assert_eq!(stmt.order_by.len(), 2);
        assert_eq!(stmt.order_by[0].ascending, Some(false));
        assert_eq!(stmt.order_by[1].ascending, None);
    }

    #[test]
    fn quoted_identifiers_are_unquoted_in_names() {
        let stmt = lower("SELECT a FROM \"Staging\".\"Users\"");
        assert_eq!(stmt.first_core().from[0].relation.name, "Staging.Users");
    }

    #[test]
    fn positions_are_one_based_and_increase() {
        let stmt = lower("SELECT id\nFROM staging.users");
        let core = stmt.first_core();
        assert_eq!(core.projection[0].position().line, 1);
        assert_eq!(core.from[0].relation.position.line, 2);
    }

    #[test]
    fn case_expression_collects_all_refs() {
        let stmt = lower(
            "SELECT CASE WHEN status = 'a' THEN amount ELSE fallback END AS v FROM t",
        );
        match &stmt.first_core().projection[0] {
            SelectItem::Expression { expr, .. } => {
                let cols: Vec<_> = expr.column_refs.iter().map(|r| r.column.as_str()).collect();
                assert_eq!(cols, vec!["status", "amount", "fallback"]);
            }
            other => panic!("expected expression, got {other:?}"),
        }
    }
}
