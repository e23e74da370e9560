//! Command Dispatcher
//!
//! This module turns one decoded request into a store operation and wraps the
//! result back into a [`Value`].
//!
//! ## Request Shapes
//!
//! A request is either an `Array` whose first element is the command name, or
//! a single text value holding a whitespace-separated command line:
//!
//! ```text
//! *2\r\n$3\r\nGET\r\n$4\r\nname\r\n     (array form)
//! +GET name\r\n                        (text form)
//! ```
//!
//! Both are normalized into one token list before dispatch. Command names are
//! matched case-insensitively against a static registry.
//!
//! ## Supported Commands
//!
//! - `GET key` - Value stored at key, or null
//! - `SET key value` - Store a value, always returns 1
//! - `DELETE key` - 1 if the key was removed, 0 if it was absent
//! - `FLUSH` - Clear the table, returns the number of keys removed
//! - `MGET key [key ...]` - Array of values in request order
//! - `MSET key value [key value ...]` - Number of pairs written

use crate::protocol::Value;
use crate::storage::Store;
use std::sync::Arc;
use thiserror::Error;

/// Errors reported to the client as an error value.
///
/// These never terminate the connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Empty request, or a request that is neither an array nor text
    #[error("missing command")]
    MissingCommand,

    /// Command name not in the registry
    #[error("unrecognized command: {0}")]
    UnknownCommand(String),

    /// Argument count does not fit the command
    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    /// Key is neither text nor an integer
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// Result type for command execution.
pub type CommandResult = Result<Value, CommandError>;

impl From<CommandError> for Value {
    /// Error frames are line-terminated, so CR and LF cannot appear in the message.
    fn from(err: CommandError) -> Self {
        let message: String = err
            .to_string()
            .chars()
            .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
            .collect();
        Value::Error(message)
    }
}

type CommandFn = fn(&Store, Vec<Value>) -> CommandResult;

/// The fixed command registry.
const COMMANDS: &[(&str, CommandFn)] = &[
    ("GET", cmd_get),
    ("SET", cmd_set),
    ("DELETE", cmd_delete),
    ("FLUSH", cmd_flush),
    ("MGET", cmd_mget),
    ("MSET", cmd_mset),
];

fn lookup(name: &str) -> Option<CommandFn> {
    COMMANDS
        .iter()
        .find(|(registered, _)| *registered == name)
        .map(|(_, handler)| *handler)
}

/// Dispatches requests against the shared store.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    storage: Arc<Store>,
}

impl CommandHandler {
    /// Creates a new command handler with the given store.
    pub fn new(storage: Arc<Store>) -> Self {
        Self { storage }
    }

    /// Executes one request and returns the response value.
    ///
    /// # Example
    ///
    /// ```
    /// use wirekv::commands::CommandHandler;
    /// use wirekv::protocol::Value;
    /// use wirekv::storage::Store;
    /// use std::sync::Arc;
    ///
    /// let handler = CommandHandler::new(Arc::new(Store::new()));
    /// assert_eq!(handler.execute(Value::str("SET k v")), Ok(Value::Int(1)));
    /// assert_eq!(handler.execute(Value::str("get k")), Ok(Value::str("v")));
    /// ```
    pub fn execute(&self, request: Value) -> CommandResult {
        let (name, args) = normalize(request)?;
        let handler = lookup(&name).ok_or(CommandError::UnknownCommand(name))?;
        handler(&self.storage, args)
    }
}

/// Splits a request into an uppercased command name and its arguments.
fn normalize(request: Value) -> Result<(String, Vec<Value>), CommandError> {
    let tokens: Vec<Value> = match request {
        Value::Array(items) => items,
        Value::Str(line) => line.split_whitespace().map(Value::from).collect(),
        _ => return Err(CommandError::MissingCommand),
    };

    let mut tokens = tokens.into_iter();
    let name = match tokens.next() {
        Some(Value::Str(name)) => name.to_uppercase(),
        Some(Value::Int(n)) => n.to_string(),
        Some(other) => return Err(CommandError::UnknownCommand(other.to_string())),
        None => return Err(CommandError::MissingCommand),
    };

    Ok((name, tokens.collect()))
}

/// Converts an argument into a store key.
fn key(value: Value) -> Result<String, CommandError> {
    match value {
        Value::Str(s) => Ok(s),
        Value::Int(n) => Ok(n.to_string()),
        other => Err(CommandError::InvalidKey(other.to_string())),
    }
}

/// Unpacks exactly `N` arguments.
fn exact<const N: usize>(name: &'static str, args: Vec<Value>) -> Result<[Value; N], CommandError> {
    args.try_into().map_err(|_| CommandError::WrongArity(name))
}

/// GET key
fn cmd_get(store: &Store, args: Vec<Value>) -> CommandResult {
    let [k] = exact::<1>("GET", args)?;
    Ok(store.get(&key(k)?))
}

/// SET key value
fn cmd_set(store: &Store, args: Vec<Value>) -> CommandResult {
    let [k, value] = exact::<2>("SET", args)?;
    store.set(key(k)?, value);
    Ok(Value::Int(1))
}

/// DELETE key
fn cmd_delete(store: &Store, args: Vec<Value>) -> CommandResult {
    let [k] = exact::<1>("DELETE", args)?;
    Ok(Value::Int(store.delete(&key(k)?) as i64))
}

/// FLUSH
fn cmd_flush(store: &Store, args: Vec<Value>) -> CommandResult {
    exact::<0>("FLUSH", args)?;
    Ok(Value::Int(store.flush() as i64))
}

/// MGET key [key ...]
fn cmd_mget(store: &Store, args: Vec<Value>) -> CommandResult {
    let keys = args.into_iter().map(key).collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Array(store.mget(&keys)))
}

/// MSET key value [key value ...]
///
/// A trailing unpaired key is ignored rather than rejected.
fn cmd_mset(store: &Store, args: Vec<Value>) -> CommandResult {
    let mut pairs = Vec::with_capacity(args.len() / 2);
    let mut args = args.into_iter();
    while let (Some(k), Some(value)) = (args.next(), args.next()) {
        pairs.push((key(k)?, value));
    }

    Ok(Value::Int(store.mset(pairs) as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_handler() -> CommandHandler {
        CommandHandler::new(Arc::new(Store::new()))
    }

    fn make_command(args: &[&str]) -> Value {
        Value::Array(args.iter().map(|s| Value::str(*s)).collect())
    }

    #[test]
    fn test_set_get() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["SET", "k", "v"]));
        assert_eq!(response, Ok(Value::Int(1)));

        let response = handler.execute(make_command(&["GET", "k"]));
        assert_eq!(response, Ok(Value::str("v")));
    }

    #[test]
    fn test_get_nonexistent() {
        let handler = create_handler();
        let response = handler.execute(make_command(&["GET", "nonexistent"]));
        assert_eq!(response, Ok(Value::Null));
    }

    #[test]
    fn test_set_stores_any_value() {
        let handler = create_handler();
        let nested = Value::Map(vec![(Value::str("a"), Value::Array(vec![Value::Int(1)]))]);

        let request = Value::Array(vec![Value::str("SET"), Value::str("k"), nested.clone()]);
        assert_eq!(handler.execute(request), Ok(Value::Int(1)));
        assert_eq!(handler.execute(make_command(&["GET", "k"])), Ok(nested));
    }

    #[test]
    fn test_delete() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["DELETE", "k"]));
        assert_eq!(response, Ok(Value::Int(0)));

        handler.execute(make_command(&["SET", "k", "v"])).unwrap();
        let response = handler.execute(make_command(&["DELETE", "k"]));
        assert_eq!(response, Ok(Value::Int(1)));

        let response = handler.execute(make_command(&["GET", "k"]));
        assert_eq!(response, Ok(Value::Null));
    }

    #[test]
    fn test_flush() {
        let handler = create_handler();
        for key in ["a", "b", "c"] {
            handler.execute(make_command(&["SET", key, "v"])).unwrap();
        }

        assert_eq!(handler.execute(make_command(&["FLUSH"])), Ok(Value::Int(3)));
        for key in ["a", "b", "c"] {
            assert_eq!(handler.execute(make_command(&["GET", key])), Ok(Value::Null));
        }
    }

    #[test]
    fn test_mset_mget() {
        let handler = create_handler();

        let request = Value::Array(vec![
            Value::str("MSET"),
            Value::str("a"),
            Value::Int(1),
            Value::str("b"),
            Value::Int(2),
        ]);
        assert_eq!(handler.execute(request), Ok(Value::Int(2)));

        let response = handler.execute(make_command(&["MGET", "a", "missing", "b"]));
        assert_eq!(
            response,
            Ok(Value::Array(vec![Value::Int(1), Value::Null, Value::Int(2)]))
        );
    }

    #[test]
    fn test_mset_drops_unpaired_argument() {
        let handler = create_handler();

        let request = Value::Array(vec![
            Value::str("MSET"),
            Value::str("a"),
            Value::Int(1),
            Value::str("b"),
            Value::Int(2),
            Value::str("c"),
        ]);
        assert_eq!(handler.execute(request), Ok(Value::Int(2)));

        assert_eq!(handler.execute(make_command(&["GET", "a"])), Ok(Value::Int(1)));
        assert_eq!(handler.execute(make_command(&["GET", "b"])), Ok(Value::Int(2)));
        assert_eq!(handler.execute(make_command(&["GET", "c"])), Ok(Value::Null));
    }

    #[test]
    fn test_mget_and_mset_without_arguments() {
        let handler = create_handler();
        assert_eq!(handler.execute(make_command(&["MGET"])), Ok(Value::Array(vec![])));
        assert_eq!(handler.execute(make_command(&["MSET"])), Ok(Value::Int(0)));
    }

    #[test]
    fn test_text_form() {
        let handler = create_handler();

        assert_eq!(handler.execute(Value::str("set  k   v")), Ok(Value::Int(1)));
        assert_eq!(handler.execute(Value::str("GET k")), Ok(Value::str("v")));
        assert_eq!(
            handler.execute(Value::str("mget k other")),
            Ok(Value::Array(vec![Value::str("v"), Value::Null]))
        );
    }

    #[test]
    fn test_case_insensitive_names() {
        let handler = create_handler();
        assert_eq!(handler.execute(make_command(&["sEt", "k", "v"])), Ok(Value::Int(1)));
        assert_eq!(handler.execute(make_command(&["get", "k"])), Ok(Value::str("v")));
    }

    #[test]
    fn test_integer_keys() {
        let handler = create_handler();
        let request = Value::Array(vec![Value::str("SET"), Value::Int(7), Value::str("seven")]);
        handler.execute(request).unwrap();

        assert_eq!(handler.execute(make_command(&["GET", "7"])), Ok(Value::str("seven")));
    }

    #[test]
    fn test_unknown_command() {
        let handler = create_handler();

        let response = handler.execute(make_command(&["foo", "bar"]));
        assert_eq!(response, Err(CommandError::UnknownCommand("FOO".to_string())));

        let value = Value::from(response.unwrap_err());
        assert_eq!(value, Value::error("unrecognized command: FOO"));
    }

    #[test]
    fn test_missing_command() {
        let handler = create_handler();

        assert_eq!(handler.execute(Value::Array(vec![])), Err(CommandError::MissingCommand));
        assert_eq!(handler.execute(Value::str("   ")), Err(CommandError::MissingCommand));
        assert_eq!(handler.execute(Value::Int(5)), Err(CommandError::MissingCommand));
        assert_eq!(handler.execute(Value::Null), Err(CommandError::MissingCommand));
    }

    #[test]
    fn test_wrong_arity() {
        let handler = create_handler();

        assert_eq!(
            handler.execute(make_command(&["GET"])),
            Err(CommandError::WrongArity("GET"))
        );
        assert_eq!(
            handler.execute(make_command(&["SET", "k"])),
            Err(CommandError::WrongArity("SET"))
        );
        assert_eq!(
            handler.execute(make_command(&["FLUSH", "now"])),
            Err(CommandError::WrongArity("FLUSH"))
        );
    }

    #[test]
    fn test_invalid_key() {
        let handler = create_handler();
        let request = Value::Array(vec![Value::str("GET"), Value::Array(vec![])]);
        assert!(matches!(handler.execute(request), Err(CommandError::InvalidKey(_))));
    }

    #[test]
    fn test_error_message_is_single_line() {
        let err = CommandError::UnknownCommand("A\r\nB".to_string());
        assert_eq!(Value::from(err), Value::error("unrecognized command: A  B"));
    }
}
