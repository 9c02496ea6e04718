use rquickjs::{Ctx, Function, Object};

/// Problems found while parsing an enum definition resource
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnumParseError {
    #[error("expected `enum <Name>` on the first line, found {0:?}")]
    MissingHeader(String),
    #[error("enum body must end with `;`")]
    MissingTerminator,
    #[error("invalid entry {0:?}")]
    InvalidEntry(String),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
    #[error("duplicate key {0}")]
    DuplicateKey(String),
}

/// A named map of symbolic constants parsed from an enum definition
///
/// The resource looks like a C enum:
///
/// ```text
/// enum ItemType
/// {
///     NoItem = -1,
///     Air = 0,
///     Stone = 1,
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumNamespace {
    name: String,
    entries: Vec<(String, i64)>,
}

impl EnumNamespace {
    pub fn parse(text: &str) -> Result<Self, EnumParseError> {
        let text = text.trim();
        let (header, body) = text.split_once('\n').unwrap_or((text, ""));

        let mut words = header.split_whitespace();
        let name = match (words.next(), words.next(), words.next()) {
            (Some("enum"), Some(name), None) => name.to_string(),
            _ => return Err(EnumParseError::MissingHeader(header.to_string())),
        };

        let body = body
            .trim()
            .strip_suffix(';')
            .ok_or(EnumParseError::MissingTerminator)?
            .trim();
        let body = body
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .unwrap_or(body);

        let mut entries: Vec<(String, i64)> = Vec::new();
        let mut next_value = 0i64;
        for raw in body.split(|c| c == ',' || c == '\n') {
            let entry = strip_comment(raw).trim();
            if entry.is_empty() {
                continue;
            }

            let (key, value) = match entry.split_once('=') {
                Some((key, value)) => {
                    let key = key.trim();
                    let value = value.trim();
                    let parsed = parse_integer(value).ok_or_else(|| EnumParseError::InvalidValue {
                        key: key.to_string(),
                        value: value.to_string(),
                    })?;
                    (key, parsed)
                }
                None => (entry, next_value),
            };

            if !is_identifier(key) {
                return Err(EnumParseError::InvalidEntry(entry.to_string()));
            }
            if entries.iter().any(|(existing, _)| existing == key) {
                return Err(EnumParseError::DuplicateKey(key.to_string()));
            }

            entries.push((key.to_string(), value));
            next_value = value + 1;
        }

        Ok(Self { name, entries })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<i64> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| *value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the frozen script object exposing every constant
    pub fn to_object<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Object<'js>> {
        let obj = Object::new(ctx.clone())?;
        for (key, value) in &self.entries {
            // Script numbers are doubles; every enum value fits exactly
            obj.set(key.as_str(), *value as f64)?;
        }

        let object_ctor: Object = ctx.globals().get("Object")?;
        let freeze: Function = object_ctor.get("freeze")?;
        freeze.call::<_, Object>((obj.clone(),))?;
        Ok(obj)
    }
}

fn strip_comment(entry: &str) -> &str {
    match entry.find("//") {
        Some(index) => &entry[..index],
        None => entry,
    }
}

fn parse_integer(value: &str) -> Option<i64> {
    let (negative, digits) = match value.strip_prefix('-') {
        Some(rest) => (true, rest.trim()),
        None => (false, value),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -magnitude } else { magnitude })
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};

    #[test]
    fn test_parse_item_type_resource() {
        let parsed = EnumNamespace::parse(crate::ITEM_TYPE_ENUM).unwrap();
        assert_eq!(parsed.name(), "ItemType");
        assert_eq!(parsed.get("NoItem"), Some(-1));
        assert_eq!(parsed.get("Air"), Some(0));
        assert_eq!(parsed.get("Stone"), Some(1));
        assert_eq!(parsed.get("Grass"), Some(2));
        assert_eq!(parsed.get("IronShovel"), Some(256));
        assert!(parsed.len() > 20);
    }

    #[test]
    fn test_parse_without_braces_and_implicit_values() {
        let parsed = EnumNamespace::parse("enum Mode\n  Idle,\n  Walk = 0x10,\n  Run\n;").unwrap();
        assert_eq!(parsed.name(), "Mode");
        assert_eq!(parsed.get("Idle"), Some(0));
        assert_eq!(parsed.get("Walk"), Some(16));
        assert_eq!(parsed.get("Run"), Some(17));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            EnumNamespace::parse("struct Foo\n{ A = 1 };"),
            Err(EnumParseError::MissingHeader(_))
        ));
        assert_eq!(
            EnumNamespace::parse("enum Foo\n{ A = 1 }"),
            Err(EnumParseError::MissingTerminator)
        );
        assert!(matches!(
            EnumNamespace::parse("enum Foo\n{ A = one };"),
            Err(EnumParseError::InvalidValue { .. })
        ));
        assert_eq!(
            EnumNamespace::parse("enum Foo\n{ A = 1, A = 2 };"),
            Err(EnumParseError::DuplicateKey("A".to_string()))
        );
        assert!(matches!(
            EnumNamespace::parse("enum Foo\n{ 1A = 1 };"),
            Err(EnumParseError::InvalidEntry(_))
        ));
    }

    #[test]
    fn test_object_is_frozen() {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(|ctx| {
            let parsed = EnumNamespace::parse("enum Foo\n{ A = 1, B = -2 };").unwrap();
            let obj = parsed.to_object(&ctx).unwrap();
            ctx.globals().set("Foo", obj).unwrap();

            let sum: f64 = ctx.eval("Foo.A + Foo.B").unwrap();
            assert_eq!(sum, -1.0);

            let frozen: bool = ctx.eval("Object.isFrozen(Foo)").unwrap();
            assert!(frozen);
        });
    }
}
