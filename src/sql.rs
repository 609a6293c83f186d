use chrono::NaiveDate;
use sqlparser::ast::{
    self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::{Minutes, Window, parse_hhmm};

/// Row filter for `SELECT * FROM bookings`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingFilter {
    ById(Ulid),
    ByDate(NaiveDate),
    ByRange { from: NaiveDate, to: NaiveDate },
}

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertBooking {
        id: Ulid,
        date: NaiveDate,
        start: Minutes,
        duration_hours: u8,
        band_name: String,
        email: String,
        phone: Option<String>,
        members_count: u32,
        notes: Option<String>,
    },
    ApproveBooking {
        id: Ulid,
    },
    RejectBooking {
        id: Ulid,
    },
    CancelBooking {
        id: Ulid,
        reason: String,
    },
    InsertBlock {
        id: Ulid,
        start_date: NaiveDate,
        end_date: NaiveDate,
        window: Option<Window>,
        reason: String,
        created_by: String,
    },
    UpdateBlock {
        id: Ulid,
        start_date: NaiveDate,
        end_date: NaiveDate,
        window: Option<Window>,
        reason: String,
    },
    DeleteBlock {
        id: Ulid,
    },
    SelectBookings {
        filter: Option<BookingFilter>,
    },
    SelectBlocks,
    SelectAvailability {
        date: NaiveDate,
        duration_hours: u8,
    },
    SelectDayFlags {
        date: NaiveDate,
    },
    SelectCalendar {
        year: i32,
        month: u32,
    },
    SelectSlots {
        date: NaiveDate,
    },
    SelectArtifact {
        booking_id: Ulid,
    },
    Listen {
        channel: String,
    },
    Unlisten {
        channel: String,
    },
    UnlistenAll,
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim();
    if let Some(rest) = strip_keyword(trimmed, "LISTEN") {
        return Ok(Command::Listen {
            channel: rest.trim_matches(';').trim().to_string(),
        });
    }
    if let Some(rest) = strip_keyword(trimmed, "UNLISTEN") {
        let channel = rest.trim_matches(';').trim();
        return Ok(if channel == "*" {
            Command::UnlistenAll
        } else {
            Command::Unlisten {
                channel: channel.to_string(),
            }
        });
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn strip_keyword<'a>(sql: &'a str, keyword: &str) -> Option<&'a str> {
    let head = sql.get(..keyword.len())?;
    if head.eq_ignore_ascii_case(keyword) {
        let rest = &sql[keyword.len()..];
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            return Some(rest);
        }
    }
    None
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        // (id, date, start_time, duration, band_name, email[, phone, members_count, notes])
        "bookings" => {
            if values.len() < 6 {
                return Err(SqlError::WrongArity("bookings", 6, values.len()));
            }
            Ok(Command::InsertBooking {
                id: parse_ulid(&values[0])?,
                date: parse_date(&values[1])?,
                start: parse_time(&values[2])?,
                duration_hours: parse_u8(&values[3])?,
                band_name: parse_string(&values[4])?,
                email: parse_string(&values[5])?,
                phone: if values.len() >= 7 {
                    parse_string_or_null(&values[6])?
                } else {
                    None
                },
                members_count: if values.len() >= 8 {
                    parse_u32(&values[7])?
                } else {
                    1
                },
                notes: if values.len() >= 9 {
                    parse_string_or_null(&values[8])?
                } else {
                    None
                },
            })
        }
        // (id, start_date, end_date, start_time, end_time, reason, created_by)
        "blocks" => {
            if values.len() < 7 {
                return Err(SqlError::WrongArity("blocks", 7, values.len()));
            }
            Ok(Command::InsertBlock {
                id: parse_ulid(&values[0])?,
                start_date: parse_date(&values[1])?,
                end_date: parse_date(&values[2])?,
                window: parse_window(&values[3], &values[4])?,
                reason: parse_string(&values[5])?,
                created_by: parse_string(&values[6])?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(&table.relation)?;
    let id = extract_where_id(selection, "id")?;

    match table.as_str() {
        "bookings" => {
            let mut status: Option<String> = None;
            let mut cancel_reason: Option<String> = None;
            for a in assignments {
                match assignment_column(a)?.as_str() {
                    "status" => status = Some(parse_string(&a.value)?),
                    "cancel_reason" => cancel_reason = parse_string_or_null(&a.value)?,
                    col => {
                        return Err(SqlError::Unsupported(format!(
                            "bookings column is not updatable: {col}"
                        )));
                    }
                }
            }
            match status.as_deref() {
                Some("approved") => Ok(Command::ApproveBooking { id }),
                Some("rejected") => Ok(Command::RejectBooking { id }),
                Some("cancelled") => Ok(Command::CancelBooking {
                    id,
                    reason: cancel_reason.unwrap_or_default(),
                }),
                Some(other) => Err(SqlError::Unsupported(format!(
                    "cannot set status to '{other}'"
                ))),
                None => Err(SqlError::MissingFilter("status")),
            }
        }
        "blocks" => {
            let mut start_date = None;
            let mut end_date = None;
            let mut start_time: Option<Option<Minutes>> = None;
            let mut end_time: Option<Option<Minutes>> = None;
            let mut reason = None;
            for a in assignments {
                match assignment_column(a)?.as_str() {
                    "start_date" => start_date = Some(parse_date(&a.value)?),
                    "end_date" => end_date = Some(parse_date(&a.value)?),
                    "start_time" => start_time = Some(parse_time_or_null(&a.value)?),
                    "end_time" => end_time = Some(parse_time_or_null(&a.value)?),
                    "reason" => reason = Some(parse_string(&a.value)?),
                    col => {
                        return Err(SqlError::Unsupported(format!(
                            "blocks column is not updatable: {col}"
                        )));
                    }
                }
            }
            let window = match (start_time.flatten(), end_time.flatten()) {
                (Some(s), Some(e)) => Some(checked_window(s, e)?),
                (None, None) => None,
                _ => {
                    return Err(SqlError::Parse(
                        "start_time and end_time must both be set or both NULL".into(),
                    ));
                }
            };
            Ok(Command::UpdateBlock {
                id,
                start_date: start_date.ok_or(SqlError::MissingFilter("start_date"))?,
                end_date: end_date.ok_or(SqlError::MissingFilter("end_date"))?,
                window,
                reason: reason.ok_or(SqlError::MissingFilter("reason"))?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    match table.as_str() {
        "blocks" => {
            let id = extract_where_id(&delete.selection, "id")?;
            Ok(Command::DeleteBlock { id })
        }
        "bookings" => Err(SqlError::Unsupported(
            "bookings are never deleted; update status instead".into(),
        )),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    match table.as_str() {
        "bookings" => {
            let mut filters = EqFilters::default();
            if let Some(selection) = &select.selection {
                collect_eq_filters(selection, &mut filters)?;
            }
            let filter = if let Some(id) = filters.take("id") {
                Some(BookingFilter::ById(parse_ulid(&id)?))
            } else if let Some(d) = filters.take("date") {
                Some(BookingFilter::ByDate(parse_date(&d)?))
            } else {
                match (filters.take_range_low("date"), filters.take_range_high("date")) {
                    (Some(from), Some(to)) => Some(BookingFilter::ByRange {
                        from: parse_date(&from)?,
                        to: parse_date(&to)?,
                    }),
                    (None, None) => None,
                    _ => return Err(SqlError::MissingFilter("date range bound")),
                }
            };
            Ok(Command::SelectBookings { filter })
        }
        "blocks" => Ok(Command::SelectBlocks),
        "availability" => {
            let mut filters = EqFilters::default();
            if let Some(selection) = &select.selection {
                collect_eq_filters(selection, &mut filters)?;
            }
            let date = filters.take("date").ok_or(SqlError::MissingFilter("date"))?;
            let duration = filters
                .take("duration")
                .ok_or(SqlError::MissingFilter("duration"))?;
            Ok(Command::SelectAvailability {
                date: parse_date(&date)?,
                duration_hours: parse_u8(&duration)?,
            })
        }
        "day_flags" => {
            let mut filters = EqFilters::default();
            if let Some(selection) = &select.selection {
                collect_eq_filters(selection, &mut filters)?;
            }
            let date = filters.take("date").ok_or(SqlError::MissingFilter("date"))?;
            Ok(Command::SelectDayFlags {
                date: parse_date(&date)?,
            })
        }
        "calendar" => {
            let mut filters = EqFilters::default();
            if let Some(selection) = &select.selection {
                collect_eq_filters(selection, &mut filters)?;
            }
            let year = filters.take("year").ok_or(SqlError::MissingFilter("year"))?;
            let month = filters
                .take("month")
                .ok_or(SqlError::MissingFilter("month"))?;
            Ok(Command::SelectCalendar {
                year: parse_i64(&year)? as i32,
                month: parse_u32(&month)?,
            })
        }
        "slots" => {
            let mut filters = EqFilters::default();
            if let Some(selection) = &select.selection {
                collect_eq_filters(selection, &mut filters)?;
            }
            let date = filters.take("date").ok_or(SqlError::MissingFilter("date"))?;
            Ok(Command::SelectSlots {
                date: parse_date(&date)?,
            })
        }
        "artifacts" => {
            let mut filters = EqFilters::default();
            if let Some(selection) = &select.selection {
                collect_eq_filters(selection, &mut filters)?;
            }
            let id = filters
                .take("booking_id")
                .ok_or(SqlError::MissingFilter("booking_id"))?;
            Ok(Command::SelectArtifact {
                booking_id: parse_ulid(&id)?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── WHERE clause handling ─────────────────────────────────────

/// Flat conjunction of `col = value`, `col >= value`, `col <= value` filters.
#[derive(Default)]
struct EqFilters {
    eq: Vec<(String, Expr)>,
    ge: Vec<(String, Expr)>,
    le: Vec<(String, Expr)>,
}

impl EqFilters {
    fn take(&mut self, col: &str) -> Option<Expr> {
        let pos = self.eq.iter().position(|(c, _)| c == col)?;
        Some(self.eq.remove(pos).1)
    }

    fn take_range_low(&mut self, col: &str) -> Option<Expr> {
        let pos = self.ge.iter().position(|(c, _)| c == col)?;
        Some(self.ge.remove(pos).1)
    }

    fn take_range_high(&mut self, col: &str) -> Option<Expr> {
        let pos = self.le.iter().position(|(c, _)| c == col)?;
        Some(self.le.remove(pos).1)
    }
}

fn collect_eq_filters(expr: &Expr, out: &mut EqFilters) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                collect_eq_filters(left, out)?;
                collect_eq_filters(right, out)?;
            }
            ast::BinaryOperator::Eq => {
                if let Some(col) = expr_column_name(left) {
                    out.eq.push((col, (**right).clone()));
                }
            }
            ast::BinaryOperator::GtEq => {
                if let Some(col) = expr_column_name(left) {
                    out.ge.push((col, (**right).clone()));
                }
            }
            ast::BinaryOperator::LtEq => {
                if let Some(col) = expr_column_name(left) {
                    out.le.push((col, (**right).clone()));
                }
            }
            other => {
                return Err(SqlError::Unsupported(format!("operator {other} in WHERE")));
            }
        },
        Expr::Nested(inner) => collect_eq_filters(inner, out)?,
        other => {
            return Err(SqlError::Unsupported(format!("expression {other} in WHERE")));
        }
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.len() {
            0 => Err(SqlError::Parse("empty VALUES".into())),
            1 => Ok(values.rows[0].clone()),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn assignment_column(a: &ast::Assignment) -> Result<String, SqlError> {
    match &a.target {
        ast::AssignmentTarget::ColumnName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty column name".into()))
        }
        _ => Err(SqlError::Parse("unsupported assignment target".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>, col: &'static str) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter(col))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if expr_column_name(left).as_deref() == Some(col) {
                parse_ulid(right)
            } else {
                Err(SqlError::MissingFilter(col))
            }
        }
        _ => Err(SqlError::MissingFilter(col)),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => {
                Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) => Ok(s.clone()),
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    if let Some(Value::Null) = extract_value(expr) {
        return Ok(None);
    }
    parse_string(expr).map(Some)
}

fn parse_date(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let s = parse_string(expr)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .map_err(|e| SqlError::Parse(format!("bad date '{s}': {e}")))
}

fn parse_time(expr: &Expr) -> Result<Minutes, SqlError> {
    let s = parse_string(expr)?;
    parse_hhmm(&s).ok_or_else(|| SqlError::Parse(format!("bad time '{s}': expected HH:MM")))
}

fn parse_time_or_null(expr: &Expr) -> Result<Option<Minutes>, SqlError> {
    if let Some(Value::Null) = extract_value(expr) {
        return Ok(None);
    }
    parse_time(expr).map(Some)
}

/// Both block times present: build the window, end-of-day `24:00` not
/// expressible in HH:MM so partial blocks always end within the day.
fn parse_window(start: &Expr, end: &Expr) -> Result<Option<Window>, SqlError> {
    match (parse_time_or_null(start)?, parse_time_or_null(end)?) {
        (Some(s), Some(e)) => Ok(Some(checked_window(s, e)?)),
        (None, None) => Ok(None),
        _ => Err(SqlError::Parse(
            "start_time and end_time must both be set or both NULL".into(),
        )),
    }
}

fn checked_window(start: Minutes, end: Minutes) -> Result<Window, SqlError> {
    if start >= end {
        return Err(SqlError::Parse(format!(
            "block window start {start} must be before end {end}"
        )));
    }
    Ok(Window::new(start, end))
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_u8(expr: &Expr) -> Result<u8, SqlError> {
    let v = parse_i64(expr)?;
    u8::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u8 range")))
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

    #[test]
    fn parse_insert_booking_minimal() {
        let sql = format!(
            "INSERT INTO bookings (id, date, start_time, duration, band_name, email) \
             VALUES ('{ID}', '2026-09-11', '14:00', 3, 'Kassette', 'k@example.org')"
        );
        let cmd = parse_sql(&sql).unwrap();
        match cmd {
            Command::InsertBooking {
                id,
                date,
                start,
                duration_hours,
                band_name,
                email,
                phone,
                members_count,
                notes,
            } => {
                assert_eq!(id.to_string(), ID);
                assert_eq!(date, "2026-09-11".parse().unwrap());
                assert_eq!(start, 14 * 60);
                assert_eq!(duration_hours, 3);
                assert_eq!(band_name, "Kassette");
                assert_eq!(email, "k@example.org");
                assert_eq!(phone, None);
                assert_eq!(members_count, 1);
                assert_eq!(notes, None);
            }
            _ => panic!("expected InsertBooking, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_booking_full() {
        let sql = format!(
            "INSERT INTO bookings (id, date, start_time, duration, band_name, email, phone, members_count, notes) \
             VALUES ('{ID}', '2026-09-11', '09:30', 2, 'Kassette', 'k@example.org', '+49 30 1234', 5, 'drums provided')"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertBooking {
                start,
                phone,
                members_count,
                notes,
                ..
            } => {
                assert_eq!(start, 570);
                assert_eq!(phone.as_deref(), Some("+49 30 1234"));
                assert_eq!(members_count, 5);
                assert_eq!(notes.as_deref(), Some("drums provided"));
            }
            cmd => panic!("expected InsertBooking, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_booking_null_phone() {
        let sql = format!(
            "INSERT INTO bookings (id, date, start_time, duration, band_name, email, phone, members_count) \
             VALUES ('{ID}', '2026-09-11', '14:00', 1, 'X', 'x@example.org', NULL, 3)"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertBooking { phone, members_count, .. } => {
                assert_eq!(phone, None);
                assert_eq!(members_count, 3);
            }
            cmd => panic!("expected InsertBooking, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_booking_bad_time() {
        let sql = format!(
            "INSERT INTO bookings (id, date, start_time, duration, band_name, email) \
             VALUES ('{ID}', '2026-09-11', '25:00', 1, 'X', 'x@example.org')"
        );
        assert!(parse_sql(&sql).is_err());
    }

    #[test]
    fn parse_status_updates() {
        let sql = format!("UPDATE bookings SET status = 'approved' WHERE id = '{ID}'");
        assert!(matches!(parse_sql(&sql).unwrap(), Command::ApproveBooking { .. }));

        let sql = format!("UPDATE bookings SET status = 'rejected' WHERE id = '{ID}'");
        assert!(matches!(parse_sql(&sql).unwrap(), Command::RejectBooking { .. }));

        let sql = format!(
            "UPDATE bookings SET status = 'cancelled', cancel_reason = 'duplicate' WHERE id = '{ID}'"
        );
        match parse_sql(&sql).unwrap() {
            Command::CancelBooking { reason, .. } => assert_eq!(reason, "duplicate"),
            cmd => panic!("expected CancelBooking, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_update_to_pending_is_unsupported() {
        let sql = format!("UPDATE bookings SET status = 'pending' WHERE id = '{ID}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_update_other_column_is_unsupported() {
        let sql = format!("UPDATE bookings SET band_name = 'Other' WHERE id = '{ID}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_delete_booking_refused() {
        let sql = format!("DELETE FROM bookings WHERE id = '{ID}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_insert_block_full_day() {
        let sql = format!(
            "INSERT INTO blocks (id, start_date, end_date, start_time, end_time, reason, created_by) \
             VALUES ('{ID}', '2026-09-01', '2026-09-03', NULL, NULL, 'floor refinishing', 'staff')"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertBlock { window, reason, .. } => {
                assert_eq!(window, None);
                assert_eq!(reason, "floor refinishing");
            }
            cmd => panic!("expected InsertBlock, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_block_partial() {
        let sql = format!(
            "INSERT INTO blocks (id, start_date, end_date, start_time, end_time, reason, created_by) \
             VALUES ('{ID}', '2026-09-01', '2026-09-01', '09:00', '12:00', 'tuning', 'staff')"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertBlock { window, .. } => {
                assert_eq!(window, Some(Window::new(540, 720)));
            }
            cmd => panic!("expected InsertBlock, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_block_one_sided_window_errors() {
        let sql = format!(
            "INSERT INTO blocks (id, start_date, end_date, start_time, end_time, reason, created_by) \
             VALUES ('{ID}', '2026-09-01', '2026-09-01', '09:00', NULL, 'tuning', 'staff')"
        );
        assert!(parse_sql(&sql).is_err());
    }

    #[test]
    fn parse_update_block() {
        let sql = format!(
            "UPDATE blocks SET start_date = '2026-09-02', end_date = '2026-09-04', \
             start_time = NULL, end_time = NULL, reason = 'extended' WHERE id = '{ID}'"
        );
        match parse_sql(&sql).unwrap() {
            Command::UpdateBlock {
                start_date,
                end_date,
                window,
                reason,
                ..
            } => {
                assert_eq!(start_date, "2026-09-02".parse().unwrap());
                assert_eq!(end_date, "2026-09-04".parse().unwrap());
                assert_eq!(window, None);
                assert_eq!(reason, "extended");
            }
            cmd => panic!("expected UpdateBlock, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_delete_block() {
        let sql = format!("DELETE FROM blocks WHERE id = '{ID}'");
        assert!(matches!(parse_sql(&sql).unwrap(), Command::DeleteBlock { .. }));
    }

    #[test]
    fn parse_select_availability() {
        let sql = "SELECT * FROM availability WHERE date = '2026-09-11' AND duration = 2";
        match parse_sql(sql).unwrap() {
            Command::SelectAvailability {
                date,
                duration_hours,
            } => {
                assert_eq!(date, "2026-09-11".parse().unwrap());
                assert_eq!(duration_hours, 2);
            }
            cmd => panic!("expected SelectAvailability, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_availability_requires_filters() {
        assert!(matches!(
            parse_sql("SELECT * FROM availability"),
            Err(SqlError::MissingFilter("date"))
        ));
        assert!(matches!(
            parse_sql("SELECT * FROM availability WHERE date = '2026-09-11'"),
            Err(SqlError::MissingFilter("duration"))
        ));
    }

    #[test]
    fn parse_select_bookings_filters() {
        assert_eq!(
            parse_sql("SELECT * FROM bookings").unwrap(),
            Command::SelectBookings { filter: None }
        );
        match parse_sql(&format!("SELECT * FROM bookings WHERE id = '{ID}'")).unwrap() {
            Command::SelectBookings {
                filter: Some(BookingFilter::ById(id)),
            } => assert_eq!(id.to_string(), ID),
            cmd => panic!("expected id filter, got {cmd:?}"),
        }
        match parse_sql("SELECT * FROM bookings WHERE date = '2026-09-11'").unwrap() {
            Command::SelectBookings {
                filter: Some(BookingFilter::ByDate(d)),
            } => assert_eq!(d, "2026-09-11".parse().unwrap()),
            cmd => panic!("expected date filter, got {cmd:?}"),
        }
        match parse_sql(
            "SELECT * FROM bookings WHERE date >= '2026-09-01' AND date <= '2026-09-30'",
        )
        .unwrap()
        {
            Command::SelectBookings {
                filter: Some(BookingFilter::ByRange { from, to }),
            } => {
                assert_eq!(from, "2026-09-01".parse().unwrap());
                assert_eq!(to, "2026-09-30".parse().unwrap());
            }
            cmd => panic!("expected range filter, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_calendar() {
        match parse_sql("SELECT * FROM calendar WHERE year = 2026 AND month = 9").unwrap() {
            Command::SelectCalendar { year, month } => {
                assert_eq!(year, 2026);
                assert_eq!(month, 9);
            }
            cmd => panic!("expected SelectCalendar, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_select_day_flags_and_slots() {
        assert!(matches!(
            parse_sql("SELECT * FROM day_flags WHERE date = '2026-09-11'").unwrap(),
            Command::SelectDayFlags { .. }
        ));
        assert!(matches!(
            parse_sql("SELECT * FROM slots WHERE date = '2026-09-11'").unwrap(),
            Command::SelectSlots { .. }
        ));
    }

    #[test]
    fn parse_select_artifact() {
        match parse_sql(&format!("SELECT * FROM artifacts WHERE booking_id = '{ID}'")).unwrap() {
            Command::SelectArtifact { booking_id } => assert_eq!(booking_id.to_string(), ID),
            cmd => panic!("expected SelectArtifact, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_listen_unlisten() {
        assert_eq!(
            parse_sql("LISTEN artifacts").unwrap(),
            Command::Listen {
                channel: "artifacts".into()
            }
        );
        assert_eq!(
            parse_sql("UNLISTEN artifacts;").unwrap(),
            Command::Unlisten {
                channel: "artifacts".into()
            }
        );
        assert_eq!(parse_sql("UNLISTEN *").unwrap(), Command::UnlistenAll);
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = format!("INSERT INTO foobar (id) VALUES ('{ID}')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownTable(_))));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
