//! WHERE-predicate rewriting for trigger bodies.
//!
//! The analyzer keeps the predicate as text; here it is re-parsed and every
//! column reference is redirected through the trigger's row image
//! (`NEW.col` / `OLD.col`). Rewriting the AST instead of scanning the text
//! means keywords and string literals containing column-like words are
//! structurally immune, and `t.col` qualifiers are replaced rather than
//! stacked.

use std::ops::ControlFlow;

use sqlparser::ast::{visit_expressions_mut, Expr, Ident};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

use crate::error::{Error, Result};

/// Which row image a rewritten predicate refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowImage {
    New,
    Old,
}

impl RowImage {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Old => "OLD",
        }
    }
}

/// Rewrite `where_text` against the given row image:
/// `status = 'active'` becomes ``NEW.`status` = 'active'``.
pub fn rewrite(where_text: &str, image: RowImage) -> Result<String> {
    let dialect = MySqlDialect {};
    let mut expr = Parser::new(&dialect)
        .try_with_sql(where_text)
        .and_then(|mut parser| parser.parse_expr())
        .map_err(|e| Error::invalid_query(format!("WHERE predicate: {e}")))?;

    let _ = visit_expressions_mut(&mut expr, |expr| {
        match expr {
            Expr::Identifier(ident) => {
                *expr = image_reference(image, &ident.value);
            }
            Expr::CompoundIdentifier(parts) => {
                if let Some(column) = parts.last() {
                    *expr = image_reference(image, &column.value);
                }
            }
            _ => {}
        }
        ControlFlow::<()>::Continue(())
    });

    Ok(expr.to_string())
}

fn image_reference(image: RowImage, column: &str) -> Expr {
    Expr::CompoundIdentifier(vec![
        Ident::new(image.prefix()),
        Ident::with_quote('`', column),
    ])
}
