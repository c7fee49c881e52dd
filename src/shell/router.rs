use std::io::{BufRead, Write};

use log::debug;
use serde_json::{json, Value as Json};
use thiserror::Error;

use crate::config::parse_db_index;
use crate::{Result, Store};

/// Failure of a single shell command.
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("wrong number of arguments for '{0}'")]
    Arity(String),
    #[error("argument {0:?} is not an integer")]
    NotAnInteger(String),
    #[error(transparent)]
    Store(#[from] crate::Error),
}

/// The successful result of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Plain acknowledgement.
    Ok,
    /// A result value, rendered as JSON.
    Value(Json),
}

impl Reply {
    /// Renders the reply as one response line: `OK` or `OK <json>`.
    pub fn render(&self) -> String {
        match self {
            Reply::Ok => "OK".to_string(),
            Reply::Value(v) => format!("OK {}", v),
        }
    }
}

fn value<T: Into<Json>>(v: T) -> Reply {
    Reply::Value(v.into())
}

fn integer(text: &str) -> std::result::Result<i64, ShellError> {
    text.parse()
        .map_err(|_| ShellError::NotAnInteger(text.to_string()))
}

/// A command split into words.
struct Command<'a> {
    words: Vec<&'a str>,
    /// The line the words came from and the byte offset of each word in it.
    source: Option<(&'a str, Vec<usize>)>,
}

impl<'a> Command<'a> {
    fn from_words(words: &[&'a str]) -> Self {
        Self {
            words: words.to_vec(),
            source: None,
        }
    }

    fn parse(line: &'a str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut words = Vec::new();
        let mut offsets = Vec::new();
        let mut start = None;

        for (i, c) in line.char_indices() {
            match (c.is_whitespace(), start) {
                (true, Some(s)) => {
                    words.push(&line[s..i]);
                    offsets.push(s);
                    start = None;
                }
                (false, None) => start = Some(i),
                _ => {}
            }
        }
        if let Some(s) = start {
            words.push(&line[s..]);
            offsets.push(s);
        }

        Self {
            words,
            source: Some((line, offsets)),
        }
    }

    /// Word `i` and everything after it, as one value.
    fn rest(&self, i: usize) -> String {
        match &self.source {
            Some((line, offsets)) => line[offsets[i]..].to_string(),
            None => self.words[i..].join(" "),
        }
    }
}

/// Runs one command, given as separate words, against `store`.
///
/// The command name is case-insensitive. For commands whose last argument is
/// a value, the remaining words are joined into that value with single spaces.
pub fn dispatch(store: &mut Store, parts: &[&str]) -> std::result::Result<Reply, ShellError> {
    execute(store, &Command::from_words(parts))
}

/// Runs one command line against `store`.
///
/// Words are separated by whitespace, but a trailing value is taken verbatim
/// from the line, so `SET k a  b` stores `"a  b"`.
pub fn dispatch_line(store: &mut Store, line: &str) -> std::result::Result<Reply, ShellError> {
    execute(store, &Command::parse(line))
}

fn execute(store: &mut Store, cmd: &Command<'_>) -> std::result::Result<Reply, ShellError> {
    let Some((name, args)) = cmd.words.split_first() else {
        return Err(ShellError::Arity(String::new()));
    };
    let command = name.to_lowercase();

    // `fixed` arguments exactly, or `fixed` plus a trailing value.
    let exact = |n: usize| {
        if args.len() == n {
            Ok(())
        } else {
            Err(ShellError::Arity(command.clone()))
        }
    };
    let with_value = |fixed: usize| {
        if args.len() > fixed {
            Ok(cmd.rest(fixed + 1))
        } else {
            Err(ShellError::Arity(command.clone()))
        }
    };

    let reply = match command.as_str() {
        "ping" => value("PONG"),

        // keys
        "del" => {
            exact(1)?;
            value(store.del(args[0])?)
        }
        "exists" => {
            exact(1)?;
            value(store.exists(args[0])?)
        }
        "type" => {
            exact(1)?;
            value(store.key_type(args[0])?.map_or("none", |t| t.as_str()))
        }

        // strings
        "get" => {
            exact(1)?;
            value(store.get(args[0])?)
        }
        "set" => {
            let v = with_value(1)?;
            store.set(args[0], &v)?;
            Reply::Ok
        }
        "setnx" => {
            let v = with_value(1)?;
            value(store.setnx(args[0], &v)? as i64)
        }
        "getset" => {
            let v = with_value(1)?;
            value(store.getset(args[0], &v)?)
        }
        "append" => {
            let v = with_value(1)?;
            value(store.append(args[0], &v)?)
        }
        "incr" => {
            exact(1)?;
            value(store.incr(args[0])?)
        }
        "decr" => {
            exact(1)?;
            value(store.decr(args[0])?)
        }
        "incrby" => {
            exact(2)?;
            value(store.incrby(args[0], integer(args[1])?)?)
        }
        "decrby" => {
            exact(2)?;
            value(store.decrby(args[0], integer(args[1])?)?)
        }
        "strlen" => {
            exact(1)?;
            value(store.strlen(args[0])?)
        }

        // lists
        "lpush" => {
            let v = with_value(1)?;
            value(store.lpush(args[0], &v)?)
        }
        "rpush" => {
            let v = with_value(1)?;
            value(store.rpush(args[0], &v)?)
        }
        "lpushx" => {
            let v = with_value(1)?;
            value(store.lpushx(args[0], &v)?)
        }
        "rpushx" => {
            let v = with_value(1)?;
            value(store.rpushx(args[0], &v)?)
        }
        "lpop" => {
            exact(1)?;
            value(store.lpop(args[0])?)
        }
        "rpop" => {
            exact(1)?;
            value(store.rpop(args[0])?)
        }
        "llen" => {
            exact(1)?;
            value(store.llen(args[0])?)
        }
        "lindex" => {
            exact(2)?;
            value(store.lindex(args[0], integer(args[1])?)?)
        }
        "lrange" => {
            exact(3)?;
            value(store.lrange(args[0], integer(args[1])?, integer(args[2])?)?)
        }
        "lrem" => {
            let v = with_value(2)?;
            value(store.lrem(args[0], integer(args[1])?, &v)?)
        }
        "lset" => {
            let v = with_value(2)?;
            store.lset(args[0], integer(args[1])?, &v)?;
            Reply::Ok
        }
        "ltrim" => {
            exact(3)?;
            store.ltrim(args[0], integer(args[1])?, integer(args[2])?)?;
            Reply::Ok
        }
        "rpoplpush" => {
            exact(2)?;
            value(store.rpoplpush(args[0], args[1])?)
        }

        // sets
        "sadd" => {
            let v = with_value(1)?;
            value(store.sadd(args[0], &v)? as i64)
        }
        "srem" => {
            let v = with_value(1)?;
            value(store.srem(args[0], &v)? as i64)
        }
        "scard" => {
            exact(1)?;
            value(store.scard(args[0])?)
        }
        "sismember" => {
            let v = with_value(1)?;
            value(store.sismember(args[0], &v)?)
        }
        "smembers" => {
            exact(1)?;
            value(store.smembers(args[0])?)
        }
        "smove" => {
            let v = with_value(2)?;
            value(store.smove(args[0], args[1], &v)? as i64)
        }
        "spop" => {
            exact(1)?;
            value(store.spop(args[0])?)
        }
        "srandmember" => {
            exact(1)?;
            value(store.srandmember(args[0])?)
        }

        // databases
        "keys" => {
            if args.len() > 1 {
                return Err(ShellError::Arity(command.clone()));
            }
            value(store.keys())
        }
        "dbsize" => {
            exact(0)?;
            value(store.dbsize())
        }
        "flushdb" => {
            exact(0)?;
            store.flushdb()?;
            Reply::Ok
        }
        "select" => {
            exact(1)?;
            store.select(parse_db_index(args[0])?)?;
            Reply::Ok
        }
        "info" => {
            exact(0)?;
            value(json!({
                "db": store.db(),
                "databases": store.databases(),
                "keys": store.dbsize(),
            }))
        }

        _ => return Err(ShellError::UnknownCommand(command.clone())),
    };
    Ok(reply)
}

/// Reads commands line by line from `reader` and writes one response line per
/// command to `writer`, until end of input or `QUIT`.
///
/// Command failures are reported as `ERR <message>` lines and do not stop the
/// loop; only I/O errors do.
pub fn run<R: BufRead, W: Write>(mut reader: R, mut writer: W, store: &mut Store) -> Result<()> {
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            break;
        }

        let cmd = Command::parse(&line);
        let Some(name) = cmd.words.first() else {
            continue;
        };
        if name.eq_ignore_ascii_case("quit") {
            break;
        }

        let response = match execute(store, &cmd) {
            Ok(reply) => reply.render(),
            Err(e) => {
                debug!("Command {:?} failed: {}", name, e);
                format!("ERR {}", e.to_string().to_lowercase())
            }
        };
        writeln!(writer, "{}", response)?;
        writer.flush()?;
    }
    Ok(())
}
