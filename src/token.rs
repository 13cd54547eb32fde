//! Provider tokens.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

const REQUEST_SYMBOL: &str = "REQUEST";

/// Key under which a provider is registered and looked up.
///
/// A token is either a Rust type (the common case, the equivalent of a class
/// reference) or an arbitrary symbol for values that have no dedicated type,
/// such as configuration objects or trait-object bindings.
///
/// # Examples
///
/// ```rust
/// use ferrous_nest::Token;
///
/// struct Database;
///
/// let by_type = Token::of::<Database>();
/// let by_symbol = Token::symbol("DATABASE_URL");
///
/// assert_eq!(by_type, Token::of::<Database>());
/// assert_ne!(by_type, by_symbol);
/// assert_eq!(by_symbol.display_name(), "DATABASE_URL");
/// ```
#[derive(Clone)]
pub enum Token {
    /// Type token with TypeId and name for diagnostics
    Type(TypeId, &'static str),
    /// Explicit symbol
    Symbol(Arc<str>),
}

impl Token {
    /// Token for the type `T`.
    #[inline]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Token::Type(TypeId::of::<T>(), std::any::type_name::<T>())
    }

    /// Token for an arbitrary symbol.
    pub fn symbol(name: impl Into<Arc<str>>) -> Self {
        Token::Symbol(name.into())
    }

    /// Built-in token resolving to the current [`HttpRequest`](crate::http::HttpRequest)
    /// inside a request context.
    pub fn request() -> Self {
        Token::Symbol(Arc::from(REQUEST_SYMBOL))
    }

    /// True for the built-in request token.
    pub fn is_request(&self) -> bool {
        matches!(self, Token::Symbol(name) if &**name == REQUEST_SYMBOL)
    }

    /// Human-readable name used in diagnostics.
    pub fn display_name(&self) -> &str {
        match self {
            Token::Type(_, name) => name,
            Token::Symbol(name) => name,
        }
    }

    /// Last path segment of a type name, or the symbol itself.
    pub fn short_name(&self) -> &str {
        match self {
            Token::Type(_, name) => short_type_name(name),
            Token::Symbol(name) => name,
        }
    }
}

pub(crate) fn short_type_name(name: &str) -> &str {
    // generics keep their own paths; only strip the outer one
    let head = name.split('<').next().unwrap_or(name);
    match head.rfind("::") {
        Some(idx) => &name[idx + 2..],
        None => name,
    }
}

// TypeId-only comparison for type tokens; the name is diagnostic only
impl PartialEq for Token {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Token::Type(a, _), Token::Type(b, _)) => a == b,
            (Token::Symbol(a), Token::Symbol(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Token {}

impl std::hash::Hash for Token {
    #[inline]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Token::Type(id, _) => {
                0u8.hash(state);
                id.hash(state);
            }
            Token::Symbol(name) => {
                1u8.hash(state);
                name.hash(state);
            }
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Type(_, name) => write!(f, "Token({})", name),
            Token::Symbol(name) => write!(f, "Token(#{})", name),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl From<&'static str> for Token {
    fn from(name: &'static str) -> Self {
        Token::symbol(name)
    }
}
