use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::core::Value;
use crate::session::{CollectionRef, EntityRef};

/// One value produced for a result row, before or after transformation.
#[derive(Clone)]
pub enum ResultValue {
    Scalar(Value),
    Entity(Option<EntityRef>),
    Collection(Option<CollectionRef>),
    List(Vec<ResultValue>),
    Tuple(Tuple),
    Array(Vec<Value>),
    /// Output of a constructor transformer
    Object(Arc<dyn Any + Send + Sync>),
}

impl ResultValue {
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            Self::Entity(entity) => entity.as_ref(),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&CollectionRef> {
        match self {
            Self::Collection(collection) => collection.as_ref(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ResultValue]> {
        match self {
            Self::List(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&Tuple> {
        match self {
            Self::Tuple(tuple) => Some(tuple),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(values) => Some(values),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Object(object) => object.downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Self::Scalar(value) => value.is_null(),
            Self::Entity(entity) => entity.is_none(),
            Self::Collection(collection) => collection.is_none(),
            _ => false,
        }
    }

    /// Identity for unique-result filtering: entity and collection rows
    /// compare by instance.
    pub fn same_instance(&self, other: &ResultValue) -> bool {
        match (self, other) {
            (Self::Entity(Some(a)), Self::Entity(Some(b))) => a.ptr_eq(b),
            (Self::Collection(Some(a)), Self::Collection(Some(b))) => a.ptr_eq(b),
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::Scalar(a), Self::Scalar(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::List(a), Self::List(b)) => a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_instance(y)),
            (Self::Tuple(a), Self::Tuple(b)) => {
                a.values.len() == b.values.len() && a.values.iter().zip(&b.values).all(|(x, y)| x.same_instance(y))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for ResultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(value) => f.debug_tuple("Scalar").field(value).finish(),
            Self::Entity(entity) => f.debug_tuple("Entity").field(entity).finish(),
            Self::Collection(collection) => f.debug_tuple("Collection").field(collection).finish(),
            Self::List(values) => f.debug_tuple("List").field(values).finish(),
            Self::Tuple(tuple) => f.debug_tuple("Tuple").field(tuple).finish(),
            Self::Array(values) => f.debug_tuple("Array").field(values).finish(),
            Self::Object(_) => f.write_str("Object(..)"),
        }
    }
}

impl From<Value> for ResultValue {
    fn from(value: Value) -> Self {
        Self::Scalar(value)
    }
}

/// Row values addressable by alias.
#[derive(Debug, Clone)]
pub struct Tuple {
    aliases: Vec<String>,
    values: Vec<ResultValue>,
}

impl Tuple {
    pub fn new(aliases: Vec<String>, values: Vec<ResultValue>) -> Self {
        Self { aliases, values }
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn values(&self) -> &[ResultValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, alias: &str) -> Option<&ResultValue> {
        self.aliases
            .iter()
            .position(|a| a.eq_ignore_ascii_case(alias))
            .and_then(|idx| self.values.get(idx))
    }

    pub fn get_at(&self, index: usize) -> Option<&ResultValue> {
        self.values.get(index)
    }
}

/// Everything a consumer collected from one result set.
#[derive(Debug, Clone, Default)]
pub struct LoadResult {
    aliases: Vec<String>,
    rows: Vec<ResultValue>,
}

impl LoadResult {
    pub fn new(aliases: Vec<String>, rows: Vec<ResultValue>) -> Self {
        Self { aliases, rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn rows(&self) -> &[ResultValue] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<ResultValue> {
        self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Entities of a single-entity result, skipping null rows.
    pub fn entities(&self) -> Vec<EntityRef> {
        self.rows.iter().filter_map(|row| row.as_entity().cloned()).collect()
    }
}

impl IntoIterator for LoadResult {
    type Item = ResultValue;
    type IntoIter = std::vec::IntoIter<ResultValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_lookup_by_alias() {
        let tuple = Tuple::new(
            vec!["name".to_string(), "total".to_string()],
            vec![Value::Text("Ann".into()).into(), Value::Integer(3).into()],
        );
        assert_eq!(tuple.get("TOTAL").and_then(ResultValue::as_scalar), Some(&Value::Integer(3)));
        assert!(tuple.get("missing").is_none());
        assert_eq!(tuple.len(), 2);
    }

    #[test]
    fn test_object_downcast() {
        let value = ResultValue::Object(Arc::new(42u32));
        assert_eq!(value.downcast_ref::<u32>(), Some(&42));
        assert!(value.downcast_ref::<String>().is_none());
        assert!(!value.is_null());
    }

    #[test]
    fn test_scalars_compare_by_value() {
        let a = ResultValue::Scalar(Value::Integer(1));
        let b = ResultValue::Scalar(Value::Integer(1));
        assert!(a.same_instance(&b));
        assert!(ResultValue::Entity(None).is_null());
    }
}
