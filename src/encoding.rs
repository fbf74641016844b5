//! The `Serializable` capability and the JSON encoder that understands it.
//!
//! Handlers hand the framework *objects*, not bytes. The application's
//! [`JsonEncoder`] renders them once the response is bound, for the
//! [`SerializationView`] the encoder was configured with.

use serde::Serialize;
use serde_json::Value;
use serde_json::ser::{PrettyFormatter, Serializer};
use uuid::Uuid;

/// The context an object is serialized for.
///
/// An object may render differently for different audiences. Only the public
/// view exists today.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum SerializationView {
    #[default]
    Public,
}

impl SerializationView {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "PUBLIC",
        }
    }
}

/// Something that can render itself into a plain JSON value.
///
/// ```rust
/// use serde_json::{Value, json};
/// use teeth_rest::{SerializationView, Serializable};
///
/// struct Node { id: u32, secret: String }
///
/// impl Serializable for Node {
///     fn serialize(&self, _view: SerializationView) -> Value {
///         json!({ "id": self.id })
///     }
/// }
/// ```
pub trait Serializable {
    fn serialize(&self, view: SerializationView) -> Value;

    /// What the encoder calls. Override it when rendering can fail; the
    /// error then fails the response with the generic `500`.
    fn try_serialize(&self, view: SerializationView) -> Result<Value, serde_json::Error> {
        Ok(self.serialize(view))
    }
}

impl Serializable for Value {
    fn serialize(&self, _view: SerializationView) -> Value { self.clone() }
}

impl Serializable for Uuid {
    fn serialize(&self, _view: SerializationView) -> Value {
        Value::String(self.hyphenated().to_string())
    }
}

impl<T: Serializable> Serializable for Option<T> {
    fn serialize(&self, view: SerializationView) -> Value {
        match self {
            Some(v) => v.serialize(view),
            None => Value::Null,
        }
    }

    fn try_serialize(&self, view: SerializationView) -> Result<Value, serde_json::Error> {
        match self {
            Some(v) => v.try_serialize(view),
            None => Ok(Value::Null),
        }
    }
}

impl<T: Serializable> Serializable for [T] {
    fn serialize(&self, view: SerializationView) -> Value {
        Value::Array(self.iter().map(|v| v.serialize(view)).collect())
    }

    fn try_serialize(&self, view: SerializationView) -> Result<Value, serde_json::Error> {
        self.iter().map(|v| v.try_serialize(view)).collect::<Result<_, _>>().map(Value::Array)
    }
}

impl<T: Serializable> Serializable for Vec<T> {
    fn serialize(&self, view: SerializationView) -> Value {
        Serializable::serialize(self.as_slice(), view)
    }

    fn try_serialize(&self, view: SerializationView) -> Result<Value, serde_json::Error> {
        self.as_slice().try_serialize(view)
    }
}

impl<T: Serializable + ?Sized> Serializable for Box<T> {
    fn serialize(&self, view: SerializationView) -> Value {
        (**self).serialize(view)
    }

    fn try_serialize(&self, view: SerializationView) -> Result<Value, serde_json::Error> {
        (**self).try_serialize(view)
    }
}

/// Adapter for plain serde types that look the same in every view.
///
/// ```rust
/// use teeth_rest::{Json, Response};
///
/// #[derive(serde::Serialize)]
/// struct Version { version: &'static str }
///
/// let response = Response::ok(Json(Version { version: "1.0" }));
/// ```
#[derive(Clone, Debug)]
pub struct Json<T>(pub T);

impl<T: Serialize> Serializable for Json<T> {
    /// Renders `null` if `T` cannot be represented as JSON (a map with
    /// non-string keys, say). The encoder goes through
    /// [`try_serialize`](Serializable::try_serialize) and fails instead.
    fn serialize(&self, view: SerializationView) -> Value {
        self.try_serialize(view).unwrap_or(Value::Null)
    }

    fn try_serialize(&self, _view: SerializationView) -> Result<Value, serde_json::Error> {
        serde_json::to_value(&self.0)
    }
}

/// The encoder an application renders every deferred body with.
///
/// Pretty-printed output ends with a newline so `curl` output does not run
/// into the shell prompt.
#[derive(Clone, Debug)]
pub struct JsonEncoder {
    view: SerializationView,
    indent: Option<usize>,
}

impl JsonEncoder {
    /// A compact encoder for `view`. Chain [`indent`](Self::indent) to
    /// pretty-print.
    pub fn new(view: SerializationView) -> Self {
        Self { view, indent: None }
    }

    pub fn indent(mut self, spaces: usize) -> Self {
        self.indent = Some(spaces);
        self
    }

    pub fn compact(mut self) -> Self {
        self.indent = None;
        self
    }

    pub fn view(&self) -> SerializationView { self.view }

    pub fn encode(&self, obj: &dyn Serializable) -> Result<Vec<u8>, serde_json::Error> {
        let value = obj.try_serialize(self.view)?;
        match self.indent {
            None => serde_json::to_vec(&value),
            Some(spaces) => {
                let indent = vec![b' '; spaces];
                let mut out = Vec::new();
                let formatter = PrettyFormatter::with_indent(&indent);
                let mut ser = Serializer::with_formatter(&mut out, formatter);
                Serialize::serialize(&value, &mut ser)?;
                out.push(b'\n');
                Ok(out)
            }
        }
    }
}

impl Default for JsonEncoder {
    fn default() -> Self {
        Self::new(SerializationView::Public).indent(4)
    }
}
