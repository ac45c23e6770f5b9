//! Keeps the SQL shipped by the panel and db crates on the Postgres dialect.

use std::fs;
use std::path::{Path, PathBuf};

const QUERY_CALL: &str = "sqlx::query";

/// Lowercased fragments that only SQLite understands.
const SQLITE_MARKERS: &[&str] = &[
    "insert or ignore",
    "insert or replace",
    "autoincrement",
    "strftime(",
    "datetime(",
    "last_insert_rowid",
];

struct Sql {
    location: String,
    text: String,
}

impl Sql {
    fn sqlite_marker(&self) -> Option<&'static str> {
        let lower = self.text.to_lowercase();
        SQLITE_MARKERS.iter().copied().find(|m| lower.contains(m))
    }
}

fn files_with_extension(root: &Path, ext: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut dirs = vec![root.to_path_buf()];
    while let Some(dir) = dirs.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for path in entries.flatten().map(|e| e.path()) {
            if path.is_dir() {
                dirs.push(path);
            } else if path.extension().is_some_and(|e| e == ext) {
                found.push(path);
            }
        }
    }
    found.sort();
    found
}

fn db_crate() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../libs/remnadesk-db")
}

/// Reads a plain or raw Rust string literal at the start of `src`.
fn string_literal(src: &str) -> Option<String> {
    let mut chars = src.chars();
    match chars.next()? {
        '"' => {
            let mut text = String::new();
            while let Some(c) = chars.next() {
                match c {
                    '"' => return Some(text),
                    '\\' => text.extend(chars.next()),
                    c => text.push(c),
                }
            }
            None
        }
        'r' => {
            let rest = chars.as_str();
            let hashes = rest.len() - rest.trim_start_matches('#').len();
            let body = rest[hashes..].strip_prefix('"')?;
            let closing = format!("\"{}", "#".repeat(hashes));
            body.find(&closing).map(|end| body[..end].to_string())
        }
        _ => None,
    }
}

/// The SQL passed to a `sqlx::query*` call, given the text right after
/// `sqlx::query`. `None` when the first argument is not a literal.
fn call_argument(after: &str) -> Option<String> {
    let rest = after.trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '_');
    let rest = match rest.strip_prefix("::<") {
        Some(generics) => {
            let mut depth = 1;
            let close = generics.char_indices().find_map(|(i, c)| {
                match c {
                    '<' => depth += 1,
                    '>' => depth -= 1,
                    _ => {}
                }
                (depth == 0).then_some(i)
            })?;
            &generics[close + 1..]
        }
        None => rest,
    };
    let args = rest.trim_start().strip_prefix('(')?;
    string_literal(args.trim_start())
}

fn query_literals() -> Vec<Sql> {
    let panel = Path::new(env!("CARGO_MANIFEST_DIR")).join("src");
    let mut files = files_with_extension(&panel, "rs");
    files.extend(files_with_extension(&db_crate().join("src"), "rs"));
    assert!(!files.is_empty(), "no Rust sources under {}", panel.display());

    let mut found = Vec::new();
    for file in files {
        let src = fs::read_to_string(&file).unwrap_or_default();
        for (at, _) in src.match_indices(QUERY_CALL) {
            if let Some(text) = call_argument(&src[at + QUERY_CALL.len()..]) {
                let line = src[..at].matches('\n').count() + 1;
                found.push(Sql {
                    location: format!("{}:{}", file.display(), line),
                    text,
                });
            }
        }
    }
    found
}

/// Every `;`-separated statement of every migration, located by its first line.
fn migration_statements() -> Vec<Sql> {
    let dir = db_crate().join("migrations");
    let files = files_with_extension(&dir, "sql");
    assert!(!files.is_empty(), "no migrations under {}", dir.display());

    let mut found = Vec::new();
    for file in files {
        let src = fs::read_to_string(&file).unwrap_or_default();
        let mut line = 1;
        for statement in src.split(';') {
            let trimmed = statement.trim_start();
            let leading = &statement[..statement.len() - trimmed.len()];
            if !trimmed.is_empty() {
                found.push(Sql {
                    location: format!("{}:{}", file.display(), line + leading.matches('\n').count()),
                    text: trimmed.to_string(),
                });
            }
            line += statement.matches('\n').count();
        }
    }
    found
}

fn report(offending: Vec<String>, what: &str) {
    assert!(offending.is_empty(), "{}:\n{}", what, offending.join("\n"));
}

#[test]
fn reads_literal_arguments_only() {
    assert_eq!(call_argument("(\"SELECT 1\")").as_deref(), Some("SELECT 1"));
    assert_eq!(
        call_argument("_as::<_, (i64, Option<String>)>(\n    r#\"SELECT \"id\" FROM t\"#,").as_deref(),
        Some("SELECT \"id\" FROM t")
    );
    assert_eq!(call_argument("_scalar(r\"SELECT $1\")").as_deref(), Some("SELECT $1"));
    assert_eq!(call_argument("(\"a \\\"b\\\" c\")").as_deref(), Some("a \"b\" c"));
    assert!(call_argument("(&format!(\"SELECT {}\", x))").is_none());
    assert!(call_argument("(sql)").is_none());
}

#[test]
fn sqlx_queries_use_postgres_placeholders() {
    let literals = query_literals();
    assert!(!literals.is_empty(), "no sqlx query literals found");
    report(
        literals
            .iter()
            .filter(|sql| sql.text.contains('?'))
            .map(|sql| format!("{} uses a '?' placeholder", sql.location))
            .collect(),
        "SQLite placeholders in query literals",
    );
}

#[test]
fn sqlx_queries_avoid_sqlite_syntax() {
    report(
        query_literals()
            .iter()
            .filter_map(|sql| sql.sqlite_marker().map(|m| format!("{} uses `{}`", sql.location, m)))
            .collect(),
        "SQLite-only syntax in query literals",
    );
}

#[test]
fn migrations_avoid_sqlite_syntax() {
    report(
        migration_statements()
            .iter()
            .filter_map(|sql| sql.sqlite_marker().map(|m| format!("{} uses `{}`", sql.location, m)))
            .collect(),
        "SQLite-only syntax in migrations",
    );
}
