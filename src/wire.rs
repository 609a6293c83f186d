use std::collections::HashMap;
use std::fmt::Debug;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use futures::{Sink, SinkExt};
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::messages::response::NotificationResponse;
use pgwire::tokio::TlsAcceptor;
use tokio::sync::{Mutex, broadcast};

use crate::auth::GreenroomAuthSource;
use crate::engine::{CHANNEL_ARTIFACTS, CHANNEL_BOOKINGS, BlockRequest, BookingRequest, Engine, EngineError, Reject};
use crate::model::*;
use crate::observability;
use crate::sql::{self, BookingFilter, Command};
use crate::venue::VenueManager;

/// One handler per connection: carries that connection's LISTEN subscriptions.
pub struct GreenroomHandler {
    venues: Arc<VenueManager>,
    query_parser: Arc<GreenroomQueryParser>,
    subscriptions: Mutex<HashMap<String, broadcast::Receiver<String>>>,
}

impl GreenroomHandler {
    pub fn new(venues: Arc<VenueManager>) -> Self {
        Self {
            venues,
            query_parser: Arc::new(GreenroomQueryParser),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.venues.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("venue error: {e}"),
            )))
        })
    }

    /// Push pending notifications to the client, ahead of the query results —
    /// notifications are delivered at command boundaries.
    async fn drain_notifications<C>(&self, client: &mut C) -> PgWireResult<()>
    where
        C: Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let mut subs = self.subscriptions.lock().await;
        for (channel, rx) in subs.iter_mut() {
            loop {
                match rx.try_recv() {
                    Ok(payload) => {
                        client
                            .feed(PgWireBackendMessage::NotificationResponse(
                                NotificationResponse::new(0, channel.clone(), payload),
                            ))
                            .await?;
                    }
                    Err(broadcast::error::TryRecvError::Lagged(n)) => {
                        tracing::warn!("listener lagged, dropped {n} notifications on {channel}");
                    }
                    Err(_) => break,
                }
            }
        }
        Ok(())
    }

    async fn execute_command(
        &self,
        engine: &Engine,
        cmd: Command,
    ) -> PgWireResult<Vec<Response>> {
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
                engine
                    .create_booking(BookingRequest {
                        id,
                        date,
                        start,
                        duration_hours,
                        band_name,
                        email,
                        phone,
                        members_count,
                        notes,
                    })
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::ApproveBooking { id } => {
                engine.approve_booking(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::RejectBooking { id } => {
                engine.reject_booking(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::CancelBooking { id, reason } => {
                engine.cancel_booking(id, reason).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::InsertBlock {
                id,
                start_date,
                end_date,
                window,
                reason,
                created_by,
            } => {
                engine
                    .create_block(BlockRequest {
                        id,
                        start_date,
                        end_date,
                        window,
                        reason,
                        created_by,
                    })
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpdateBlock {
                id,
                start_date,
                end_date,
                window,
                reason,
            } => {
                engine
                    .update_block(BlockRequest {
                        id,
                        start_date,
                        end_date,
                        window,
                        reason,
                        created_by: String::new(),
                    })
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteBlock { id } => {
                engine.delete_block(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::SelectBookings { filter } => {
                let bookings = match filter {
                    None => engine.list_all_bookings().await,
                    Some(BookingFilter::ById(id)) => {
                        engine.get_booking(id).await.into_iter().collect()
                    }
                    Some(BookingFilter::ByDate(date)) => engine.list_bookings(date).await,
                    Some(BookingFilter::ByRange { from, to }) => engine
                        .list_bookings_range(from, to)
                        .await
                        .map_err(engine_err)?,
                };
                let schema = Arc::new(bookings_schema());
                let rows: Vec<PgWireResult<_>> = bookings
                    .iter()
                    .map(|b| encode_booking(&schema, b))
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectBlocks => {
                let blocks = engine.list_blocks().await;
                let schema = Arc::new(blocks_schema());
                let rows: Vec<PgWireResult<_>> = blocks
                    .iter()
                    .map(|b| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&b.id.to_string())?;
                        encoder.encode_field(&b.start_date.to_string())?;
                        encoder.encode_field(&b.end_date.to_string())?;
                        encoder.encode_field(&b.window.map(|w| fmt_hhmm(w.start)))?;
                        encoder.encode_field(&b.window.map(|w| fmt_hhmm(w.end)))?;
                        encoder.encode_field(&b.reason)?;
                        encoder.encode_field(&b.created_by)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectAvailability {
                date,
                duration_hours,
            } => {
                let starts = engine
                    .list_available_starts(date, duration_hours)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(availability_schema());
                let date_str = date.to_string();
                let rows: Vec<PgWireResult<_>> = starts
                    .into_iter()
                    .map(|s| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&date_str)?;
                        encoder.encode_field(&fmt_hhmm(s))?;
                        encoder.encode_field(&i32::from(duration_hours))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectDayFlags { date } => {
                let flags = engine.get_day_flags(date).await;
                let schema = Arc::new(day_flags_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&flags.date.to_string())?;
                encoder.encode_field(&flags.is_past)?;
                encoder.encode_field(&flags.is_blocked)?;
                encoder.encode_field(&flags.is_fully_booked)?;
                encoder.encode_field(&flags.is_selectable)?;
                encoder.encode_field(&flags.booked_hours)?;
                let rows: Vec<PgWireResult<_>> = vec![Ok(encoder.take_row())];
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectCalendar { year, month } => {
                let cells = engine.calendar_month(year, month).await.map_err(engine_err)?;
                let schema = Arc::new(calendar_schema());
                let rows: Vec<PgWireResult<_>> = cells
                    .iter()
                    .map(|c| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&c.date.to_string())?;
                        encoder.encode_field(&c.in_month)?;
                        encoder.encode_field(&c.flags.is_past)?;
                        encoder.encode_field(&c.flags.is_blocked)?;
                        encoder.encode_field(&c.flags.is_fully_booked)?;
                        encoder.encode_field(&c.flags.is_selectable)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectSlots { date } => {
                let slots = engine.day_schedule(date).await;
                let schema = Arc::new(slots_schema());
                let rows: Vec<PgWireResult<_>> = slots
                    .iter()
                    .map(|s| {
                        let (state, booked) = match s.state {
                            SlotState::Free => ("free", None),
                            SlotState::Booked { duration_hours } => {
                                ("booked", Some(i32::from(duration_hours)))
                            }
                            SlotState::Blocked => ("blocked", None),
                        };
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&fmt_hhmm(s.start))?;
                        encoder.encode_field(&state.to_string())?;
                        encoder.encode_field(&booked)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectArtifact { booking_id } => {
                let artifact = engine.artifact_for(booking_id).await.map_err(engine_err)?;
                let schema = Arc::new(artifacts_schema());
                let rows: Vec<PgWireResult<_>> = artifact
                    .iter()
                    .map(|a| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&booking_id.to_string())?;
                        encoder.encode_field(&a.method.as_str().to_string())?;
                        encoder.encode_field(&a.uid)?;
                        encoder.encode_field(&a.to_ics())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::Listen { channel } => {
                if channel != CHANNEL_BOOKINGS && channel != CHANNEL_ARTIFACTS {
                    return Err(PgWireError::UserError(Box::new(ErrorInfo::new(
                        "ERROR".into(),
                        "42704".into(),
                        format!(
                            "unknown channel: {channel} (expected {CHANNEL_BOOKINGS} or {CHANNEL_ARTIFACTS})"
                        ),
                    ))));
                }
                let rx = engine.notify.subscribe(&channel);
                self.subscriptions.lock().await.insert(channel, rx);
                Ok(vec![Response::Execution(Tag::new("LISTEN"))])
            }
            Command::Unlisten { channel } => {
                self.subscriptions.lock().await.remove(&channel);
                Ok(vec![Response::Execution(Tag::new("UNLISTEN"))])
            }
            Command::UnlistenAll => {
                self.subscriptions.lock().await.clear();
                Ok(vec![Response::Execution(Tag::new("UNLISTEN"))])
            }
        }
    }
}

fn encode_booking(
    schema: &Arc<Vec<FieldInfo>>,
    b: &Booking,
) -> PgWireResult<pgwire::messages::data::DataRow> {
    let mut encoder = DataRowEncoder::new(schema.clone());
    encoder.encode_field(&b.id.to_string())?;
    encoder.encode_field(&b.date.to_string())?;
    encoder.encode_field(&fmt_hhmm(b.start))?;
    encoder.encode_field(&i32::from(b.duration_hours))?;
    encoder.encode_field(&b.band_name)?;
    encoder.encode_field(&b.email)?;
    encoder.encode_field(&b.phone)?;
    encoder.encode_field(&(b.members_count as i32))?;
    encoder.encode_field(&b.notes)?;
    encoder.encode_field(&b.status.as_str().to_string())?;
    encoder.encode_field(&b.cancel_reason)?;
    encoder.encode_field(&b.created_at)?;
    Ok(encoder.take_row())
}

// ── Result schemas ───────────────────────────────────────────────

fn text_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn bool_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::BOOL, FieldFormat::Text)
}

fn int4_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT4, FieldFormat::Text)
}

fn int8_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT8, FieldFormat::Text)
}

fn bookings_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id"),
        text_field("date"),
        text_field("start_time"),
        int4_field("duration"),
        text_field("band_name"),
        text_field("email"),
        text_field("phone"),
        int4_field("members_count"),
        text_field("notes"),
        text_field("status"),
        text_field("cancel_reason"),
        int8_field("created_at"),
    ]
}

fn blocks_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id"),
        text_field("start_date"),
        text_field("end_date"),
        text_field("start_time"),
        text_field("end_time"),
        text_field("reason"),
        text_field("created_by"),
    ]
}

fn availability_schema() -> Vec<FieldInfo> {
    vec![
        text_field("date"),
        text_field("start_time"),
        int4_field("duration"),
    ]
}

fn day_flags_schema() -> Vec<FieldInfo> {
    vec![
        text_field("date"),
        bool_field("is_past"),
        bool_field("is_blocked"),
        bool_field("is_fully_booked"),
        bool_field("is_selectable"),
        int8_field("booked_hours"),
    ]
}

fn calendar_schema() -> Vec<FieldInfo> {
    vec![
        text_field("date"),
        bool_field("in_month"),
        bool_field("is_past"),
        bool_field("is_blocked"),
        bool_field("is_fully_booked"),
        bool_field("is_selectable"),
    ]
}

fn slots_schema() -> Vec<FieldInfo> {
    vec![
        text_field("start_time"),
        text_field("state"),
        int4_field("booked_duration"),
    ]
}

fn artifacts_schema() -> Vec<FieldInfo> {
    vec![
        text_field("booking_id"),
        text_field("method"),
        text_field("uid"),
        text_field("ics"),
    ]
}

/// Result schema for a statement, judged by the relation it reads.
fn schema_for_statement(sql: &str) -> Vec<FieldInfo> {
    let upper = sql.to_uppercase();
    if !upper.contains("SELECT") {
        return vec![];
    }
    if upper.contains("AVAILABILITY") {
        availability_schema()
    } else if upper.contains("DAY_FLAGS") {
        day_flags_schema()
    } else if upper.contains("CALENDAR") {
        calendar_schema()
    } else if upper.contains("SLOTS") {
        slots_schema()
    } else if upper.contains("ARTIFACTS") {
        artifacts_schema()
    } else if upper.contains("BOOKINGS") {
        bookings_schema()
    } else if upper.contains("BLOCKS") {
        blocks_schema()
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for GreenroomHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = observability::command_label(&cmd);

        let started = std::time::Instant::now();
        let result = self.execute_command(&engine, cmd).await;
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        metrics::counter!(
            observability::QUERIES_TOTAL,
            "command" => label,
            "status" => if result.is_ok() { "ok" } else { "error" }
        )
        .increment(1);

        self.drain_notifications(client).await?;
        result
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct GreenroomQueryParser;

#[async_trait]
impl QueryParser for GreenroomQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(schema_for_statement(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for GreenroomHandler {
    type Statement = String;
    type QueryParser = GreenroomQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let mut responses = self.execute_command(&engine, cmd).await?;
        self.drain_notifications(client).await?;
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            schema_for_statement(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(schema_for_statement(
            &target.statement.statement,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start
                && let Ok(n) = sql[start..i].parse::<usize>()
                && n > max {
                    max = n;
                }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let sql = portal.statement.statement.to_string();
    let params = &portal.parameters;
    let mut result = sql;

    for (i, param) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }

    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct GreenroomFactory {
    handler: Arc<GreenroomHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<GreenroomAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl GreenroomFactory {
    pub fn new(venues: Arc<VenueManager>, password: String) -> Self {
        let auth_source = GreenroomAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(GreenroomHandler::new(venues)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for GreenroomFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one connection: a fresh factory per connection keeps LISTEN
/// subscriptions connection-local.
pub async fn process_connection(
    socket: tokio::net::TcpStream,
    venues: Arc<VenueManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = Arc::new(GreenroomFactory::new(venues, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

fn engine_err(e: EngineError) -> PgWireError {
    let code = match &e {
        EngineError::Validation(Reject::SlotConflict { .. }) => "23P01",
        EngineError::Validation(_) => "22023",
        EngineError::InvalidTransition { .. } => "55000",
        EngineError::NotFound(_) => "02000",
        EngineError::AlreadyExists(_) => "23505",
        EngineError::LimitExceeded(_) => "54000",
        EngineError::Store(_) => "58000",
    };
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        e.to_string(),
    )))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
