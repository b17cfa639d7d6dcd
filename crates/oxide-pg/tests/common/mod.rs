#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use oxide_pg::{
    Backend, Command, Error, IsolationLevel, Result, ResultCursor, TransactionControl, Transport,
};
use oxide_pg_core::{PgValue, Placeholder, RenderMode, ResultSet};
use oxide_pg_derive::Model;

#[derive(Debug, Clone, PartialEq, Model)]
#[model(table = "item", schema = "app")]
pub struct Item {
    #[column(primary_key)]
    pub id: i32,
    pub name: String,
}

pub fn item(id: i32, name: &str) -> Item {
    Item {
        id,
        name: name.to_owned(),
    }
}

pub fn item_row(id: i32, name: &str) -> Vec<PgValue> {
    vec![PgValue::Int(id), PgValue::Text(name.to_owned())]
}

/// What the backend saw, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connect,
    Begin(IsolationLevel),
    Run {
        sql: String,
        params: Vec<PgValue>,
        statements: usize,
    },
    Commit,
    Rollback,
    Cancel(i32),
}

/// The server session every recording connection claims to be.
pub const SESSION_ID: i32 = 7;

#[derive(Default)]
struct State {
    events: Vec<Event>,
    responses: VecDeque<std::result::Result<Vec<ResultSet>, String>>,
    delay: Option<Duration>,
}

/// A backend that records every command and answers from a script.
///
/// Without a scripted response each statement gets an empty result set.
#[derive(Clone, Default)]
pub struct RecordingBackend {
    state: Arc<Mutex<State>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, results: Vec<ResultSet>) {
        self.state.lock().unwrap().responses.push_back(Ok(results));
    }

    pub fn fail(&self, message: &str) {
        self.state
            .lock()
            .unwrap()
            .responses
            .push_back(Err(message.to_owned()));
    }

    pub fn delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn runs(&self) -> Vec<(String, Vec<PgValue>, usize)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Run {
                    sql,
                    params,
                    statements,
                } => Some((sql, params, statements)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: Event) {
        self.state.lock().unwrap().events.push(event);
    }
}

async fn answer(state: &Arc<Mutex<State>>, command: &Command) -> Result<ResultCursor> {
    let rendered = command.render(RenderMode::Bound(Placeholder::At));
    let (response, delay) = {
        let mut state = state.lock().unwrap();
        state.events.push(Event::Run {
            sql: rendered.sql,
            params: rendered.params.iter().map(|t| t.value.clone()).collect(),
            statements: command.len(),
        });
        (state.responses.pop_front(), state.delay)
    };
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    match response {
        Some(Ok(results)) => Ok(ResultCursor::new(results)),
        Some(Err(message)) => Err(Error::Server(sqlx::Error::Protocol(message))),
        None => Ok(ResultCursor::new(
            (0..command.len()).map(|_| ResultSet::default()),
        )),
    }
}

pub struct RecordingConnection {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl Transport for RecordingConnection {
    async fn run(&mut self, command: &Command) -> Result<ResultCursor> {
        answer(&self.state, command).await
    }

    async fn session_id(&mut self) -> Result<Option<i32>> {
        Ok(Some(SESSION_ID))
    }
}

pub struct RecordingTransaction {
    state: Arc<Mutex<State>>,
    finished: bool,
}

#[async_trait]
impl Transport for RecordingTransaction {
    async fn run(&mut self, command: &Command) -> Result<ResultCursor> {
        answer(&self.state, command).await
    }
}

#[async_trait]
impl TransactionControl for RecordingTransaction {
    async fn commit(mut self) -> Result<()> {
        self.finished = true;
        self.state.lock().unwrap().events.push(Event::Commit);
        Ok(())
    }

    async fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.state.lock().unwrap().events.push(Event::Rollback);
        Ok(())
    }
}

impl Drop for RecordingTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.state.lock().unwrap().events.push(Event::Rollback);
        }
    }
}

#[async_trait]
impl Backend for RecordingBackend {
    type Connection = RecordingConnection;
    type Transaction = RecordingTransaction;

    async fn connect(&self) -> Result<Self::Connection> {
        self.record(Event::Connect);
        Ok(RecordingConnection {
            state: Arc::clone(&self.state),
        })
    }

    async fn begin(&self, isolation: IsolationLevel) -> Result<Self::Transaction> {
        self.record(Event::Begin(isolation));
        Ok(RecordingTransaction {
            state: Arc::clone(&self.state),
            finished: false,
        })
    }

    async fn cancel(&self, session: i32) -> Result<()> {
        self.record(Event::Cancel(session));
        Ok(())
    }
}
