use crate::{
    error::StreamsError,
    operator::{Data, Key, Operator, Output},
    record::Change,
};
use std::borrow::Cow;

type MapFn<K, V> = Box<dyn Fn(&K, &V) -> Result<(K, V), StreamsError>>;

/// Stateless record-by-record transformation.
///
/// Applies `map_func` to the key and new value of every input change and
/// emits the result as a stream record.  The function may change the key,
/// which re-keys the stream.
pub struct MapOperator<K, V> {
    name: String,
    map_func: MapFn<K, V>,
}

impl<K, V> MapOperator<K, V> {
    pub fn new<F>(name: impl Into<String>, map_func: F) -> Self
    where
        F: Fn(&K, &V) -> Result<(K, V), StreamsError> + 'static,
    {
        Self {
            name: name.into(),
            map_func: Box::new(map_func),
        }
    }
}

impl<K, V> Operator<K, V> for MapOperator<K, V>
where
    K: Key,
    V: Data,
{
    fn name(&self) -> Cow<'static, str> {
        Cow::Owned(format!("map({})", self.name))
    }

    fn eval(
        &mut self,
        _port: usize,
        change: Change<K, V>,
        output: &mut Output<K, V>,
    ) -> Result<(), StreamsError> {
        let (key, value) = (self.map_func)(&change.key, &change.new)?;
        output.push(Change::insert(key, value));
        Ok(())
    }
}
