use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::debug;

use crate::core::{LoadError, Result, Value};
use crate::result::{ResultValue, Tuple};

/// Turns the assembled values of one row into the row's result.
pub trait RowTransformer: Send + Sync {
    /// Registry name
    fn name(&self) -> &str;

    fn transform(&self, values: Vec<ResultValue>, aliases: &[String]) -> Result<ResultValue>;
}

/// All values, as a list
pub struct IdentityTransformer;

impl RowTransformer for IdentityTransformer {
    fn name(&self) -> &str {
        "identity"
    }

    fn transform(&self, values: Vec<ResultValue>, _aliases: &[String]) -> Result<ResultValue> {
        Ok(ResultValue::List(values))
    }
}

/// The only value of a one-column row
pub struct SingleColumnTransformer;

impl RowTransformer for SingleColumnTransformer {
    fn name(&self) -> &str {
        "single"
    }

    fn transform(&self, mut values: Vec<ResultValue>, _aliases: &[String]) -> Result<ResultValue> {
        if values.len() != 1 {
            return Err(LoadError::Transformer(format!(
                "Single-column projection over a row of {} values",
                values.len()
            )));
        }
        values
            .pop()
            .ok_or_else(|| LoadError::Transformer("Empty row".to_string()))
    }
}

pub struct TupleTransformer;

impl RowTransformer for TupleTransformer {
    fn name(&self) -> &str {
        "tuple"
    }

    fn transform(&self, values: Vec<ResultValue>, aliases: &[String]) -> Result<ResultValue> {
        Ok(ResultValue::Tuple(Tuple::new(aliases.to_vec(), values)))
    }
}

/// Primitive array; every value must be a scalar.
pub struct ArrayTransformer;

impl RowTransformer for ArrayTransformer {
    fn name(&self) -> &str {
        "array"
    }

    fn transform(&self, values: Vec<ResultValue>, _aliases: &[String]) -> Result<ResultValue> {
        values
            .into_iter()
            .enumerate()
            .map(|(position, value)| match value {
                ResultValue::Scalar(value) => Ok(value),
                other => Err(LoadError::Transformer(format!(
                    "Array projection needs basic values, found {:?} at {}",
                    other, position
                ))),
            })
            .collect::<Result<Vec<Value>>>()
            .map(ResultValue::Array)
    }
}

type Constructor = dyn Fn(Vec<ResultValue>) -> Result<Arc<dyn Any + Send + Sync>> + Send + Sync;

/// Calls a user-supplied constructor with the row values.
pub struct ConstructorTransformer {
    name: String,
    constructor: Box<Constructor>,
}

impl ConstructorTransformer {
    pub fn new<F, T>(name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(Vec<ResultValue>) -> Result<T> + Send + Sync + 'static,
        T: Any + Send + Sync,
    {
        Self {
            name: name.into(),
            constructor: Box::new(move |values| {
                constructor(values).map(|object| Arc::new(object) as Arc<dyn Any + Send + Sync>)
            }),
        }
    }
}

impl RowTransformer for ConstructorTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, values: Vec<ResultValue>, _aliases: &[String]) -> Result<ResultValue> {
        (self.constructor)(values).map(ResultValue::Object)
    }
}

/// Row transformers by name
pub struct TransformerRegistry {
    transformers: HashMap<String, Arc<dyn RowTransformer>>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self {
            transformers: HashMap::new(),
        }
    }

    /// Registers a transformer, replacing any with the same name.
    pub fn register(&mut self, transformer: Arc<dyn RowTransformer>) {
        debug!("Registered row transformer: {}", transformer.name());
        self.transformers
            .insert(transformer.name().to_string(), transformer);
    }

    pub fn with_default_transformers() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(IdentityTransformer));
        registry.register(Arc::new(SingleColumnTransformer));
        registry.register(Arc::new(TupleTransformer));
        registry.register(Arc::new(ArrayTransformer));
        registry
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn RowTransformer>> {
        self.transformers.get(name).cloned()
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn RowTransformer>> {
        self.find(name)
            .ok_or_else(|| LoadError::Transformer(format!("No row transformer named '{}'", name)))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transformers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for TransformerRegistry {
    fn default() -> Self {
        Self::with_default_transformers()
    }
}

impl fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformerRegistry")
            .field("transformers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalars(values: &[i64]) -> Vec<ResultValue> {
        values.iter().map(|v| ResultValue::Scalar(Value::Integer(*v))).collect()
    }

    #[test]
    fn test_default_registry() {
        let registry = TransformerRegistry::default();
        assert_eq!(registry.names(), vec!["array", "identity", "single", "tuple"]);
        assert!(registry.find("missing").is_none());
        assert!(matches!(registry.get("missing"), Err(LoadError::Transformer(_))));
    }

    #[test]
    fn test_single_column_requires_one_value() {
        let single = SingleColumnTransformer;
        let value = single.transform(scalars(&[7]), &[]).unwrap();
        assert_eq!(value.as_scalar(), Some(&Value::Integer(7)));
        assert!(single.transform(scalars(&[1, 2]), &[]).is_err());
    }

    #[test]
    fn test_array_rejects_entities() {
        let array = ArrayTransformer;
        let value = array.transform(scalars(&[1, 2]), &[]).unwrap();
        assert_eq!(value.as_array().map(<[Value]>::len), Some(2));

        let mixed = vec![ResultValue::Scalar(Value::Integer(1)), ResultValue::Entity(None)];
        assert!(array.transform(mixed, &[]).is_err());
    }

    #[test]
    fn test_constructor_builds_objects() {
        #[derive(Debug, PartialEq)]
        struct Total(i64);

        let constructor = ConstructorTransformer::new("total", |values: Vec<ResultValue>| {
            let sum = values
                .iter()
                .filter_map(|v| v.as_scalar().and_then(Value::as_i64))
                .sum();
            Ok(Total(sum))
        });
        assert_eq!(constructor.name(), "total");
        let value = constructor.transform(scalars(&[2, 3]), &[]).unwrap();
        assert_eq!(value.downcast_ref::<Total>(), Some(&Total(5)));
    }

    #[test]
    fn test_tuple_keeps_aliases() {
        let aliases = vec!["a".to_string(), "b".to_string()];
        let value = TupleTransformer.transform(scalars(&[1, 2]), &aliases).unwrap();
        let tuple = value.as_tuple().unwrap();
        assert_eq!(tuple.get("b").and_then(ResultValue::as_scalar), Some(&Value::Integer(2)));
    }
}
