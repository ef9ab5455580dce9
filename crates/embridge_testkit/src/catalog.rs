//! Tables and statement execution for [`crate::MemoryEngine`].

use crate::parser::{CmpOp, Expr, Predicate, Projection, Statement};
use embridge_engine::{Row, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Named parameter values.
pub(crate) type Params = BTreeMap<String, Value>;

const SUPPORTED_TYPES: &[&str] = &[
    "INT64", "INT32", "INT16", "INT8", "UINT64", "UINT32", "DOUBLE", "FLOAT", "STRING", "BOOL",
    "BOOLEAN",
];

struct Column {
    name: String,
    ty: String,
}

struct Table {
    columns: Vec<Column>,
    primary_key: usize,
    rows: Vec<Row>,
}

impl Table {
    fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// The output of one statement.
#[derive(Debug, Default)]
pub(crate) struct Output {
    pub columns: Vec<String>,
    pub types: Vec<String>,
    pub rows: Vec<Row>,
}

/// All node tables of one database.
#[derive(Default)]
pub(crate) struct Catalog {
    tables: BTreeMap<String, Table>,
}

/// A node variable bound to one row of a table.
struct Binding<'a> {
    var: &'a str,
    table: &'a Table,
    row: &'a Row,
}

impl Catalog {
    /// Checks that every table, property and variable a statement mentions
    /// exists.
    pub(crate) fn bind(&self, statement: &Statement) -> Result<(), String> {
        match statement {
            Statement::CreateTable {
                name,
                columns,
                primary_key,
            } => {
                if self.tables.contains_key(name) {
                    return Err(format!("Binder exception: {name} already exists in catalog."));
                }
                if let Some((_, ty)) = columns
                    .iter()
                    .find(|(_, ty)| !SUPPORTED_TYPES.contains(&ty.as_str()))
                {
                    return Err(format!("Binder exception: Unsupported data type {ty}."));
                }
                if !columns.iter().any(|(c, _)| c == primary_key) {
                    return Err(format!(
                        "Binder exception: Primary key {primary_key} does not match any of the predefined node properties."
                    ));
                }
                Ok(())
            }
            Statement::CreateNode {
                var,
                table,
                properties,
            } => {
                let t = self.table(table)?;
                for (prop, expr) in properties {
                    if t.column(prop).is_none() {
                        let owner = var.as_deref().unwrap_or(table);
                        return Err(format!(
                            "Binder exception: Cannot find property {prop} for {owner}."
                        ));
                    }
                    bind_expr(expr, None)?;
                }
                Ok(())
            }
            Statement::Match {
                var,
                table,
                filter,
                projections,
                order_by,
                limit,
            } => {
                let t = self.table(table)?;
                let scope = Some((var.as_str(), t));
                for predicate in filter {
                    bind_expr(&predicate.left, scope)?;
                    bind_expr(&predicate.right, scope)?;
                }
                for projection in projections {
                    bind_expr(&projection.expr, scope)?;
                }
                if projections.len() > 1
                    && projections.iter().any(|p| p.expr == Expr::CountStar)
                {
                    return Err(
                        "Binder exception: COUNT(*) cannot be combined with other return items."
                            .to_string(),
                    );
                }
                if let Some((expr, _)) = order_by {
                    bind_expr(expr, scope)?;
                }
                if let Some(limit) = limit {
                    bind_expr(limit, None)?;
                }
                Ok(())
            }
            Statement::Return { projections } => {
                for projection in projections {
                    bind_expr(&projection.expr, None)?;
                }
                Ok(())
            }
        }
    }

    /// Executes a bound statement.
    pub(crate) fn execute(&mut self, statement: &Statement, params: &Params) -> Result<Output, String> {
        match statement {
            Statement::CreateTable {
                name,
                columns,
                primary_key,
            } => {
                let columns: Vec<Column> = columns
                    .iter()
                    .map(|(name, ty)| Column {
                        name: name.clone(),
                        ty: ty.clone(),
                    })
                    .collect();
                let primary_key = columns
                    .iter()
                    .position(|c| &c.name == primary_key)
                    .unwrap_or_default();
                self.tables.insert(
                    name.clone(),
                    Table {
                        columns,
                        primary_key,
                        rows: Vec::new(),
                    },
                );
                Ok(Output {
                    columns: vec!["result".to_string()],
                    types: vec!["STRING".to_string()],
                    rows: vec![vec![Value::String(format!("Table {name} has been created."))]],
                })
            }
            Statement::CreateNode {
                table, properties, ..
            } => {
                let t = self
                    .tables
                    .get_mut(table)
                    .ok_or_else(|| missing_table(table))?;
                let mut row: Row = vec![Value::Null; t.columns.len()];
                for (prop, expr) in properties {
                    let index = t
                        .column(prop)
                        .ok_or_else(|| format!("Binder exception: Cannot find property {prop} for {table}."))?;
                    let value = eval(expr, None, params)?;
                    row[index] = coerce(value, &t.columns[index].ty)?;
                }
                let key = &row[t.primary_key];
                if key.is_null() {
                    return Err(
                        "Runtime exception: Found NULL, which violates the non-null constraint of the primary key column."
                            .to_string(),
                    );
                }
                if t.rows.iter().any(|r| &r[t.primary_key] == key) {
                    return Err(format!(
                        "Runtime exception: Found duplicated primary key value {key}, which violates the uniqueness constraint of the primary key column."
                    ));
                }
                t.rows.push(row);
                Ok(Output::default())
            }
            Statement::Match {
                var,
                table,
                filter,
                projections,
                order_by,
                limit,
            } => {
                let t = self.table(table)?;
                let mut matched = Vec::new();
                for row in &t.rows {
                    let binding = Binding { var, table: t, row };
                    if matches_all(filter, &binding, params)? {
                        matched.push(row);
                    }
                }

                if let Some((key, descending)) = order_by {
                    let mut keyed = matched
                        .into_iter()
                        .map(|row| {
                            let binding = Binding { var, table: t, row };
                            eval(key, Some(&binding), params).map(|k| (k, row))
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    keyed.sort_by(|(a, _), (b, _)| order_values(a, b, *descending));
                    matched = keyed.into_iter().map(|(_, row)| row).collect();
                }

                if let Some(limit) = limit {
                    match eval(limit, None, params)? {
                        Value::Int64(n) if n >= 0 => matched.truncate(n as usize),
                        _ => {
                            return Err(
                                "Runtime exception: LIMIT must be a non-negative integer."
                                    .to_string(),
                            )
                        }
                    }
                }

                let columns = projections.iter().map(|p| p.name.clone()).collect();
                if projections.iter().any(|p| p.expr == Expr::CountStar) {
                    return Ok(Output {
                        columns,
                        types: vec!["INT64".to_string()],
                        rows: vec![vec![Value::Int64(matched.len() as i64)]],
                    });
                }

                let types = projections
                    .iter()
                    .map(|p| projection_type(p, var, t, params))
                    .collect();
                let rows = matched
                    .into_iter()
                    .map(|row| {
                        let binding = Binding { var, table: t, row };
                        projections
                            .iter()
                            .map(|p| eval(&p.expr, Some(&binding), params))
                            .collect::<Result<Row, _>>()
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Output {
                    columns,
                    types,
                    rows,
                })
            }
            Statement::Return { projections } => {
                let row = projections
                    .iter()
                    .map(|p| eval(&p.expr, None, params))
                    .collect::<Result<Row, _>>()?;
                Ok(Output {
                    columns: projections.iter().map(|p| p.name.clone()).collect(),
                    types: row.iter().map(Value::type_name).collect(),
                    rows: vec![row],
                })
            }
        }
    }

    fn table(&self, name: &str) -> Result<&Table, String> {
        self.tables.get(name).ok_or_else(|| missing_table(name))
    }
}

fn missing_table(name: &str) -> String {
    format!("Binder exception: Table {name} does not exist.")
}

fn bind_expr(expr: &Expr, scope: Option<(&str, &Table)>) -> Result<(), String> {
    match expr {
        Expr::Property { var, prop } => match scope {
            Some((bound, table)) if bound == var => {
                if table.column(prop).is_none() {
                    Err(format!("Binder exception: Cannot find property {prop} for {var}."))
                } else {
                    Ok(())
                }
            }
            _ => Err(format!("Binder exception: Variable {var} is not in scope.")),
        },
        Expr::Var(var) => match scope {
            Some((bound, _)) if bound == var => Ok(()),
            _ => Err(format!("Binder exception: Variable {var} is not in scope.")),
        },
        Expr::List(items) => items.iter().try_for_each(|e| bind_expr(e, scope)),
        Expr::Literal(_) | Expr::Param(_) | Expr::CountStar => Ok(()),
    }
}

fn eval(expr: &Expr, binding: Option<&Binding<'_>>, params: &Params) -> Result<Value, String> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Param(name) => params
            .get(name)
            .cloned()
            .ok_or_else(|| format!("Parameter {name} not found.")),
        Expr::List(items) => Ok(Value::List(
            items
                .iter()
                .map(|e| eval(e, binding, params))
                .collect::<Result<_, _>>()?,
        )),
        Expr::Property { var, prop } => {
            let binding = binding
                .filter(|b| b.var == var)
                .ok_or_else(|| format!("Binder exception: Variable {var} is not in scope."))?;
            let index = binding
                .table
                .column(prop)
                .ok_or_else(|| format!("Binder exception: Cannot find property {prop} for {var}."))?;
            Ok(binding.row[index].clone())
        }
        Expr::Var(var) => {
            let binding = binding
                .filter(|b| b.var == var)
                .ok_or_else(|| format!("Binder exception: Variable {var} is not in scope."))?;
            Ok(Value::Struct(
                binding
                    .table
                    .columns
                    .iter()
                    .zip(binding.row.iter())
                    .map(|(c, v)| (c.name.clone(), v.clone()))
                    .collect(),
            ))
        }
        Expr::CountStar => Ok(Value::Int64(1)),
    }
}

fn projection_type(projection: &Projection, var: &str, table: &Table, params: &Params) -> String {
    match &projection.expr {
        Expr::Property { prop, .. } => table
            .column(prop)
            .map(|i| table.columns[i].ty.clone())
            .unwrap_or_else(|| "ANY".to_string()),
        Expr::Var(v) if v == var => "NODE".to_string(),
        other => eval(other, None, params)
            .map(|v| v.type_name())
            .unwrap_or_else(|_| "ANY".to_string()),
    }
}

fn matches_all(filter: &[Predicate], binding: &Binding<'_>, params: &Params) -> Result<bool, String> {
    for predicate in filter {
        let left = eval(&predicate.left, Some(binding), params)?;
        let right = eval(&predicate.right, Some(binding), params)?;
        let holds = match compare(&left, &right) {
            Some(ordering) => match predicate.op {
                CmpOp::Eq => ordering == Ordering::Equal,
                CmpOp::Ne => ordering != Ordering::Equal,
                CmpOp::Lt => ordering == Ordering::Less,
                CmpOp::Le => ordering != Ordering::Greater,
                CmpOp::Gt => ordering == Ordering::Greater,
                CmpOp::Ge => ordering != Ordering::Less,
            },
            None => false,
        };
        if !holds {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Compares two values of compatible types. `None` for nulls and
/// incompatible types.
pub(crate) fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Int64(x), Value::Int64(y)) => Some(x.cmp(y)),
        _ => Some(numeric(a)?.partial_cmp(&numeric(b)?)?),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Int64(i) => Some(*i as f64),
        Value::UInt64(u) => Some(*u as f64),
        Value::Int128(i) => Some(*i as f64),
        Value::Double(d) => Some(*d),
        _ => None,
    }
}

/// Sort order with nulls last in both directions.
fn order_values(a: &Value, b: &Value, descending: bool) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) if descending => compare(b, a).unwrap_or(Ordering::Equal),
        (false, false) => compare(a, b).unwrap_or(Ordering::Equal),
    }
}

/// Converts a value to a column's declared type.
fn coerce(value: Value, ty: &str) -> Result<Value, String> {
    let coerced = match (ty, &value) {
        (_, Value::Null) => Some(Value::Null),
        ("INT64" | "INT32" | "INT16" | "INT8", Value::Int64(_)) => Some(value.clone()),
        ("INT64" | "INT32" | "INT16" | "INT8", Value::UInt64(u)) => {
            i64::try_from(*u).ok().map(Value::Int64)
        }
        ("UINT64" | "UINT32", Value::UInt64(_)) => Some(value.clone()),
        ("UINT64" | "UINT32", Value::Int64(i)) => u64::try_from(*i).ok().map(Value::UInt64),
        ("DOUBLE" | "FLOAT", _) => numeric(&value).map(Value::Double),
        ("STRING", Value::String(_)) => Some(value.clone()),
        ("BOOL" | "BOOLEAN", Value::Bool(_)) => Some(value.clone()),
        _ => None,
    };
    coerced.ok_or_else(|| {
        format!(
            "Binder exception: Expression {value} has data type {} but expected {ty}.",
            value.type_name()
        )
    })
}
