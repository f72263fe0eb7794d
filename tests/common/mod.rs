// Record types shared by the integration tests.
#![allow(dead_code)]

use rust_sqlite_orm::{HasMany, Model, Record, SchemaBuilder, SqlDate, SqlType, Value};

#[derive(Debug, Clone)]
pub struct User {
    record: Record,
    pub scores: HasMany<Score>,
}

impl Model for User {
    fn table_name() -> &'static str {
        "users"
    }

    fn declare(schema: &mut SchemaBuilder<Self>) {
        schema
            .field("name", "Fernando")
            .has_many::<Score>("scores", |u| &u.scores, |u| &mut u.scores);
    }

    fn from_record(record: Record) -> Self {
        User {
            record,
            scores: HasMany::new(),
        }
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }
}

impl User {
    pub fn named(name: &str) -> Self {
        let mut user = User::instantiate();
        user.set_name(name);
        user
    }

    pub fn name(&self) -> &str {
        self.record.get("name").and_then(Value::as_text).unwrap_or_default()
    }

    pub fn set_name(&mut self, name: &str) {
        self.record.set("name", name).expect("name is a text field");
    }
}

#[derive(Debug, Clone)]
pub struct Score {
    record: Record,
}

impl Model for Score {
    fn table_name() -> &'static str {
        "scores"
    }

    fn declare(schema: &mut SchemaBuilder<Self>) {
        schema.field("highscore", 0).belongs_to::<User>("user");
    }

    fn from_record(record: Record) -> Self {
        Score { record }
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }
}

impl Score {
    pub fn with_highscore(highscore: i32) -> Self {
        let mut score = Score::instantiate();
        score
            .record
            .set("highscore", highscore)
            .expect("highscore is an int32 field");
        score
    }

    pub fn highscore(&self) -> i32 {
        self.record
            .get("highscore")
            .and_then(Value::as_i32)
            .unwrap_or_default()
    }

    pub fn user_id(&self) -> i64 {
        self.record
            .get("user_id")
            .and_then(Value::as_i64)
            .unwrap_or(-1)
    }
}

/// One field of every supported kind.
#[derive(Debug, Clone)]
pub struct Sample {
    record: Record,
}

impl Model for Sample {
    fn table_name() -> &'static str {
        "samples"
    }

    fn declare(schema: &mut SchemaBuilder<Self>) {
        schema
            .field("count", 0)
            .field("total", 0i64)
            .typed_field("weight", SqlType::Num, 0i64)
            .field("ratio", 0.0)
            .field("active", false)
            .field("label", "")
            .field("created", SqlDate::from("1970-01-01 00:00:00"))
            .field("stamp", SqlDate::Epoch(0));
    }

    fn from_record(record: Record) -> Self {
        Sample { record }
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }
}

impl Sample {
    pub fn filled() -> Self {
        let mut sample = Sample::instantiate();
        let record = sample.record_mut();
        record.set("count", 7).expect("int32");
        record.set("total", 9_000_000_000i64).expect("int64");
        record.set("weight", 42i64).expect("int64");
        record.set("ratio", 0.25).expect("float64");
        record.set("active", true).expect("bool");
        record.set("label", "first").expect("text");
        record
            .set("created", SqlDate::from("2012-11-07 10:00:00"))
            .expect("date");
        record.set("stamp", SqlDate::Epoch(1_352_282_400)).expect("date");
        sample
    }
}
