use serde::{Deserialize, Serialize};

/// SQL flavor the bulk statements are rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    /// Backtick identifiers, `?` placeholders.
    #[default]
    MySql,
    /// Double-quoted identifiers, `$1..$n` placeholders.
    Postgres,
    /// Double-quoted identifiers, `?` placeholders.
    Sqlite,
}

impl SqlDialect {
    /// Quote an identifier, doubling any embedded quote character.
    pub fn quote_ident(&self, ident: &str) -> String {
        let quote = match self {
            SqlDialect::MySql => '`',
            SqlDialect::Postgres | SqlDialect::Sqlite => '"',
        };
        let mut quoted = String::with_capacity(ident.len() + 2);
        quoted.push(quote);
        for ch in ident.chars() {
            if ch == quote {
                quoted.push(quote);
            }
            quoted.push(ch);
        }
        quoted.push(quote);
        quoted
    }

    pub fn placeholders(&self) -> Placeholders {
        Placeholders {
            dialect: *self,
            next: 1,
        }
    }
}

/// Hands out positional placeholders in parameter order.
#[derive(Debug)]
pub struct Placeholders {
    dialect: SqlDialect,
    next: usize,
}

impl Placeholders {
    pub fn next(&mut self) -> String {
        let idx = self.next;
        self.next += 1;
        match self.dialect {
            SqlDialect::Postgres => format!("${}", idx),
            SqlDialect::MySql | SqlDialect::Sqlite => "?".to_string(),
        }
    }

    /// Number of placeholders issued so far.
    pub fn issued(&self) -> usize {
        self.next - 1
    }
}

/// Rows per statement allowed by both the row cap and an optional bound-parameter cap.
pub fn rows_per_statement(
    max_batch_size: usize,
    max_parameters: Option<usize>,
    params_per_row: usize,
) -> usize {
    let by_params = match max_parameters {
        Some(limit) if params_per_row > 0 => limit / params_per_row,
        _ => usize::MAX,
    };
    max_batch_size.min(by_params).max(1)
}
