//! Reference collection over a parsed statement
//!
//! Walks one `sqlparser` statement with the AST visitor and records what the schema
//! check needs: referenced relations, table aliases, CTE and table-function names,
//! select-list aliases and column references.

use sqlparser::ast::{
    AssignmentTarget, Expr, Ident, ObjectName, Query, SelectItem, SetExpr, Statement, TableFactor,
    Visit, Visitor,
};
use std::collections::HashMap;
use std::ops::ControlFlow;

/// Identifier as written, with whether it was quoted
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Name {
    pub value: String,
    pub quoted: bool,
}

impl Name {
    fn matches(&self, other: &str) -> bool {
        self.value == other || (!self.quoted && self.value.eq_ignore_ascii_case(other))
    }
}

impl From<&Ident> for Name {
    fn from(ident: &Ident) -> Self {
        Self { value: ident.value.clone(), quoted: ident.quote_style.is_some() }
    }
}

/// A column reference, optionally qualified by a table name or alias
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ColumnRef {
    pub qualifier: Option<Name>,
    pub column: Name,
}

/// Everything one statement references
#[derive(Debug, Default)]
pub(crate) struct References {
    /// Relations in order of appearance, CTEs and table functions removed
    pub tables: Vec<Name>,
    aliases: HashMap<String, Name>,
    select_aliases: Vec<String>,
    pub columns: Vec<ColumnRef>,
}

impl References {
    pub fn collect(statement: &Statement) -> Self {
        let mut collector = Collector::default();
        let _ = statement.visit(&mut collector);
        collector.finish()
    }

    /// Table a qualifier stands for, resolving aliases
    pub fn resolve_qualifier<'a>(&'a self, qualifier: &'a Name) -> &'a Name {
        self.aliases
            .get(&qualifier.value)
            .or_else(|| {
                if qualifier.quoted {
                    return None;
                }
                self.aliases
                    .iter()
                    .find(|(alias, _)| alias.eq_ignore_ascii_case(&qualifier.value))
                    .map(|(_, table)| table)
            })
            .unwrap_or(qualifier)
    }

    pub fn is_select_alias(&self, column: &Name) -> bool {
        self.select_aliases.iter().any(|alias| column.matches(alias))
    }
}

#[derive(Default)]
struct Collector {
    relations: Vec<Name>,
    functions: Vec<String>,
    ctes: Vec<String>,
    aliases: HashMap<String, Name>,
    select_aliases: Vec<String>,
    columns: Vec<ColumnRef>,
    /// INSERT column list waiting for its target, the next relation visited
    insert_columns: Option<Vec<Ident>>,
}

impl Collector {
    fn finish(self) -> References {
        let Self { relations, functions, ctes, aliases, select_aliases, columns, .. } = self;

        let mut tables: Vec<Name> = Vec::new();
        for relation in relations {
            let excluded = functions.iter().chain(&ctes).any(|name| relation.matches(name));
            if !excluded && !tables.contains(&relation) {
                tables.push(relation);
            }
        }

        References { tables, aliases, select_aliases, columns }
    }

    fn collect_select_aliases(&mut self, body: &SetExpr) {
        match body {
            SetExpr::Select(select) => {
                for item in &select.projection {
                    if let SelectItem::ExprWithAlias { alias, .. } = item {
                        self.select_aliases.push(alias.value.clone());
                    }
                }
            }
            SetExpr::SetOperation { left, right, .. } => {
                self.collect_select_aliases(left);
                self.collect_select_aliases(right);
            }
            SetExpr::Query(query) => self.collect_select_aliases(&query.body),
            _ => {}
        }
    }
}

fn last_part(name: &ObjectName) -> Option<Name> {
    name.0.last().map(Name::from)
}

/// Split a dotted name into (qualifier, column)
fn column_parts(idents: &[Ident]) -> Option<ColumnRef> {
    let (column, rest) = idents.split_last()?;
    Some(ColumnRef { qualifier: rest.last().map(Name::from), column: Name::from(column) })
}

impl Visitor for Collector {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<Self::Break> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.ctes.push(cte.alias.name.value.clone());
                // `WITH x(a, b)` renames the CTE's output columns
                self.select_aliases.extend(cte.alias.columns.iter().map(|c| c.name.value.clone()));
            }
        }
        self.collect_select_aliases(&query.body);
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        if let Some(name) = last_part(relation) {
            if let Some(pending) = self.insert_columns.take() {
                self.columns.extend(pending.iter().map(|column| ColumnRef {
                    qualifier: Some(name.clone()),
                    column: column.into(),
                }));
            }
            self.relations.push(name);
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, table_factor: &TableFactor) -> ControlFlow<Self::Break> {
        if let TableFactor::Table { name, alias, args, .. } = table_factor {
            if let Some(table) = last_part(name) {
                if args.is_some() {
                    self.functions.push(table.value);
                } else if let Some(alias) = alias {
                    self.aliases.insert(alias.name.value.clone(), table);
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_statement(&mut self, statement: &Statement) -> ControlFlow<Self::Break> {
        match statement {
            Statement::Insert(insert) if !insert.columns.is_empty() => {
                self.insert_columns = Some(insert.columns.clone());
            }
            Statement::Update { assignments, .. } => {
                for assignment in assignments {
                    let targets = match &assignment.target {
                        AssignmentTarget::ColumnName(name) => std::slice::from_ref(name),
                        AssignmentTarget::Tuple(names) => names.as_slice(),
                    };
                    self.columns.extend(targets.iter().filter_map(|n| column_parts(&n.0)));
                }
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        match expr {
            Expr::Identifier(ident) => {
                self.columns.push(ColumnRef { qualifier: None, column: ident.into() });
            }
            Expr::CompoundIdentifier(idents) => {
                if let Some(column) = column_parts(idents) {
                    self.columns.push(column);
                }
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::GenericDialect;
    use sqlparser::parser::Parser;

    fn refs(sql: &str) -> References {
        let statements = Parser::parse_sql(&GenericDialect {}, sql).unwrap();
        References::collect(&statements[0])
    }

    fn names(list: &[Name]) -> Vec<&str> {
        list.iter().map(|n| n.value.as_str()).collect()
    }

    #[test]
    fn test_tables_and_aliases() {
        let r = refs("SELECT u.name, o.id FROM users u JOIN orders AS o ON o.user_id = u.id");
        assert_eq!(names(&r.tables), vec!["users", "orders"]);

        let qualifier = Name { value: "u".to_string(), quoted: false };
        assert_eq!(r.resolve_qualifier(&qualifier).value, "users");
    }

    #[test]
    fn test_schema_qualified_table_uses_last_part() {
        let r = refs("SELECT id FROM public.users");
        assert_eq!(names(&r.tables), vec!["users"]);
    }

    #[test]
    fn test_cte_names_are_not_tables() {
        let r = refs("WITH recent AS (SELECT id AS rid FROM orders) SELECT rid FROM recent");
        assert_eq!(names(&r.tables), vec!["orders"]);
        assert!(r.is_select_alias(&Name { value: "rid".to_string(), quoted: false }));
    }

    #[test]
    fn test_cte_column_list_names() {
        let r = refs("WITH x(a, b) AS (SELECT id, total FROM orders) SELECT a, b FROM x");
        assert!(r.is_select_alias(&Name { value: "a".to_string(), quoted: false }));
        assert!(r.is_select_alias(&Name { value: "b".to_string(), quoted: false }));
    }

    #[test]
    fn test_compound_identifier_split() {
        let r = refs("SELECT db.users.name FROM users");
        let column = &r.columns[0];
        assert_eq!(column.qualifier.as_ref().unwrap().value, "users");
        assert_eq!(column.column.value, "name");
    }

    #[test]
    fn test_function_arguments_are_columns_but_wildcards_are_not() {
        let r = refs("SELECT COUNT(*), MAX(age) FROM users");
        let columns: Vec<&str> = r.columns.iter().map(|c| c.column.value.as_str()).collect();
        assert_eq!(columns, vec!["age"]);
    }

    #[test]
    fn test_insert_columns_are_qualified_by_target() {
        let r = refs("INSERT INTO users (id, nickname) VALUES (1, 'x')");
        assert_eq!(names(&r.tables), vec!["users"]);
        assert_eq!(r.columns.len(), 2);
        assert_eq!(r.columns[1].qualifier.as_ref().unwrap().value, "users");
        assert_eq!(r.columns[1].column.value, "nickname");
    }

    #[test]
    fn test_update_assignment_targets() {
        let r = refs("UPDATE users SET nickname = 'x' WHERE id = 1");
        let columns: Vec<&str> = r.columns.iter().map(|c| c.column.value.as_str()).collect();
        assert!(columns.contains(&"nickname"));
        assert!(columns.contains(&"id"));
    }

    #[test]
    fn test_quoted_identifiers_flagged() {
        let r = refs(r#"SELECT "Name" FROM users"#);
        assert!(r.columns[0].column.quoted);
    }
}
