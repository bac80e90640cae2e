//! Small helpers shared by the query builder and the in-memory table.

use crate::{Error, Record, Result, Value};
use std::collections::HashMap;

/// Splits items into chunks of at most `size` (a zero size counts as one).
pub fn chunkify<T, I>(items: I, size: usize) -> Vec<Vec<T>>
where
    I: IntoIterator<Item = T>,
{
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut chunk = Vec::with_capacity(size);
    for item in items {
        chunk.push(item);
        if chunk.len() == size {
            chunks.push(std::mem::replace(&mut chunk, Vec::with_capacity(size)));
        }
    }
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
    chunks
}

/// Yields unique lowercase names `aaa`, `aab`, ... `zzz` (for length 3).
#[derive(Debug, Clone)]
pub struct AsciiStringGenerator {
    length: u32,
    counter: u64,
}

impl AsciiStringGenerator {
    pub fn new(length: u32) -> Self {
        Self { length, counter: 0 }
    }
}

impl Default for AsciiStringGenerator {
    fn default() -> Self {
        Self::new(3)
    }
}

impl Iterator for AsciiStringGenerator {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let max = 26u64.checked_pow(self.length)?;
        if self.counter >= max {
            return None;
        }
        let name = (0..self.length)
            .rev()
            .map(|pos| {
                let index = (self.counter / 26u64.pow(pos)) % 26;
                char::from(b'a' + index as u8)
            })
            .collect();
        self.counter += 1;
        Some(name)
    }
}

/// Substitutes `{key}` placeholders in `template`.
///
/// An unknown placeholder is an expression error; `{{`/`}}` are not
/// special.
pub fn format_template(template: &str, values: &HashMap<String, String>) -> Result<String> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        output.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('}').ok_or_else(|| {
            Error::Expression(format!("Unclosed placeholder in {:?}", template))
        })?;
        let key = &after[..end];
        let value = values.get(key).ok_or_else(|| {
            Error::Expression(format!("Unknown placeholder {{{}}} in {:?}", key, template))
        })?;
        output.push_str(value);
        rest = &after[end + 1..];
    }
    output.push_str(rest);
    Ok(output)
}

/// Follows a dotted path through nested maps.
pub fn get_nested_item<'a, S: AsRef<str>>(record: &'a Record, path: &[S]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = record.get(first.as_ref())?;
    for part in rest {
        current = current.as_map()?.get(part.as_ref())?;
    }
    Some(current)
}

/// Picks the singular or plural noun for log messages.
pub fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        singular.to_string()
    } else {
        plural.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    #[test]
    fn test_chunkify() {
        assert_eq!(chunkify(1..=5, 2), vec![vec![1, 2], vec![3, 4], vec![5]]);
        assert_eq!(chunkify(Vec::<i32>::new(), 2), Vec::<Vec<i32>>::new());
        assert_eq!(chunkify(1..=2, 0), vec![vec![1], vec![2]]);
    }

    #[test]
    fn test_ascii_string_generator() {
        let mut names = AsciiStringGenerator::default();
        assert_eq!(names.next().as_deref(), Some("aaa"));
        assert_eq!(names.next().as_deref(), Some("aab"));
        assert_eq!(names.nth(23).as_deref(), Some("aaz"));
        assert_eq!(names.next().as_deref(), Some("aba"));
        assert_eq!(AsciiStringGenerator::new(2).last().as_deref(), Some("zz"));
        assert_eq!(AsciiStringGenerator::new(1).count(), 26);
    }

    #[test]
    fn test_format_template() {
        let values: HashMap<String, String> = [("a", "#aaa"), ("a__value", ":aaa")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(format_template("{a} = {a__value}", &values).unwrap(), "#aaa = :aaa");
        assert!(format_template("{b}", &values).is_err());
        assert!(format_template("{a", &values).is_err());
    }

    #[test]
    fn test_get_nested_item() {
        let inner = record! { "city" => "Paris" };
        let r = record! { "address" => inner, "id" => 1 };
        assert_eq!(get_nested_item(&r, &["address", "city"]), Some(&Value::from("Paris")));
        assert_eq!(get_nested_item(&r, &["id", "city"]), None);
        assert_eq!(get_nested_item::<&str>(&r, &[]), None);
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize(1, "item", "items"), "item");
        assert_eq!(pluralize(2, "item", "items"), "items");
    }
}
