//! The "areas of interest" callback tree: the caller-built specification of
//! which fields of a record should be materialized, and which should be
//! skipped without allocation.
//!
//! Sinks are plain function pointers, not boxed closures: the only mutable
//! context a sink can touch is the caller-owned `state` threaded through
//! `Reader::lookup`, so there is nothing for a closure to capture that a
//! state field couldn't hold instead, and a tree of function pointers costs
//! nothing to build or walk.

use std::collections::BTreeMap;

pub type TextSink<S> = fn(&mut S, &str);
pub type IntSink<S> = fn(&mut S, i64);
pub type FloatSink<S> = fn(&mut S, f64);
pub type BytesSink<S> = fn(&mut S, &[u8]);
pub type BigIntSink<S> = fn(&mut S, u128);
pub type BoolSink<S> = fn(&mut S, bool);
pub type ObjectBeginSink<S> = fn(&mut S);
pub type ObjectEndSink<S> = fn(&mut S);
pub type ArrayBeginSink<S> = fn(&mut S, usize);
pub type ArrayEndSink<S> = fn(&mut S);
pub type ArrayElementSink<S> = fn(&mut S, usize, usize);
pub type NetworkSink<S> = fn(&mut S, &[u8], usize);

/// One node of the callback tree: a typed sink, or a compound node that
/// recurses into children.
pub enum Callback<S> {
    Text(TextSink<S>),
    Int(IntSink<S>),
    Float(FloatSink<S>),
    Bytes(BytesSink<S>),
    BigInt(BigIntSink<S>),
    Bool(BoolSink<S>),
    Array(ArrayCallback<S>),
    Object(ObjectCallback<S>),
}

/// Per-field sinks for a map, keyed by field name.
pub struct ObjectCallback<S> {
    pub(crate) fields: BTreeMap<&'static str, Callback<S>>,
    pub(crate) on_begin: Option<ObjectBeginSink<S>>,
    pub(crate) on_end: Option<ObjectEndSink<S>>,
}

impl<S> ObjectCallback<S> {
    pub fn field(&self, key: &str) -> Option<&Callback<S>> {
        self.fields.get(key)
    }
}

/// Per-index sinks for an array. `elements` holds a small pool of distinct
/// sub-callbacks built once at construction time; `select` maps an
/// `(index, length)` pair to an index into that pool (or out of range to
/// mean "skip"), which is how a caller expresses e.g. "even/odd" dispatch
/// without allocating a fresh callback per element at decode time. `on_element`
/// fires for every index before dispatch, with `state` in hand, so a caller
/// can record per-index progress (e.g. `(Index:i/size)` trace markers) that
/// `select` itself has no way to emit since it can't touch `state`.
pub struct ArrayCallback<S> {
    pub(crate) elements: Vec<Callback<S>>,
    pub(crate) select: fn(usize, usize) -> Option<usize>,
    pub(crate) on_begin: Option<ArrayBeginSink<S>>,
    pub(crate) on_end: Option<ArrayEndSink<S>>,
    pub(crate) on_element: Option<ArrayElementSink<S>>,
}

impl<S> ArrayCallback<S> {
    pub fn element_for(&self, index: usize, length: usize) -> Option<&Callback<S>> {
        (self.select)(index, length).and_then(|i| self.elements.get(i))
    }
}

/// The top-level callback passed to `Reader::lookup`: an object describing
/// the record's fields, plus the network sink that is always invoked
/// regardless of whether a data record was found.
pub struct RecordCallback<S> {
    pub(crate) object: ObjectCallback<S>,
    pub(crate) on_network: Option<NetworkSink<S>>,
}

impl<S> RecordCallback<S> {
    pub fn object(&self) -> &ObjectCallback<S> {
        &self.object
    }

    pub fn on_network(&self) -> Option<NetworkSink<S>> {
        self.on_network
    }
}

/// Builder for an [`ObjectCallback`]. Consumes and returns `self` so nested
/// objects are built with a closure rather than a borrowed child builder:
///
/// ```
/// use mmdb::callback::ObjectBuilder;
///
/// struct State { city: String }
///
/// let tree = ObjectBuilder::<State>::new()
///     .text("city", |s, v| s.city = v.to_owned())
///     .obj("continent", |b| b.text("code", |_s, _v| {}))
///     .build();
/// let _ = tree;
/// ```
pub struct ObjectBuilder<S> {
    fields: BTreeMap<&'static str, Callback<S>>,
    on_begin: Option<ObjectBeginSink<S>>,
    on_end: Option<ObjectEndSink<S>>,
}

impl<S> Default for ObjectBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> ObjectBuilder<S> {
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
            on_begin: None,
            on_end: None,
        }
    }

    fn insert(&mut self, key: &'static str, callback: Callback<S>) {
        if self.fields.insert(key, callback).is_some() {
            panic!("duplicate callback registration for field `{key}`");
        }
    }

    pub fn on_begin(mut self, sink: ObjectBeginSink<S>) -> Self {
        if self.on_begin.replace(sink).is_some() {
            panic!("on_begin already registered for this object");
        }
        self
    }

    pub fn on_end(mut self, sink: ObjectEndSink<S>) -> Self {
        if self.on_end.replace(sink).is_some() {
            panic!("on_end already registered for this object");
        }
        self
    }

    pub fn text(mut self, key: &'static str, sink: TextSink<S>) -> Self {
        self.insert(key, Callback::Text(sink));
        self
    }

    pub fn integer(mut self, key: &'static str, sink: IntSink<S>) -> Self {
        self.insert(key, Callback::Int(sink));
        self
    }

    pub fn number(mut self, key: &'static str, sink: FloatSink<S>) -> Self {
        self.insert(key, Callback::Float(sink));
        self
    }

    pub fn bytes(mut self, key: &'static str, sink: BytesSink<S>) -> Self {
        self.insert(key, Callback::Bytes(sink));
        self
    }

    pub fn big_int(mut self, key: &'static str, sink: BigIntSink<S>) -> Self {
        self.insert(key, Callback::BigInt(sink));
        self
    }

    pub fn boolean(mut self, key: &'static str, sink: BoolSink<S>) -> Self {
        self.insert(key, Callback::Bool(sink));
        self
    }

    pub fn obj(mut self, key: &'static str, build: impl FnOnce(ObjectBuilder<S>) -> ObjectBuilder<S>) -> Self {
        let child = build(ObjectBuilder::new()).build();
        self.insert(key, Callback::Object(child));
        self
    }

    pub fn array(mut self, key: &'static str, array: ArrayCallback<S>) -> Self {
        self.insert(key, Callback::Array(array));
        self
    }

    pub fn build(self) -> ObjectCallback<S> {
        ObjectCallback {
            fields: self.fields,
            on_begin: self.on_begin,
            on_end: self.on_end,
        }
    }

    pub fn build_record(self) -> RecordCallback<S> {
        RecordCallback {
            object: self.build(),
            on_network: None,
        }
    }

    pub fn build_record_with_network(self, on_network: NetworkSink<S>) -> RecordCallback<S> {
        RecordCallback {
            object: self.build(),
            on_network: Some(on_network),
        }
    }
}

/// Builder for an [`ArrayCallback`]. `elements` are distinct per-slot
/// callbacks (usually just one, shared by every index); `select` decides,
/// for a given `(index, length)`, which element callback (if any) applies.
pub struct ArrayBuilder<S> {
    elements: Vec<Callback<S>>,
    select: fn(usize, usize) -> Option<usize>,
    on_begin: Option<ArrayBeginSink<S>>,
    on_end: Option<ArrayEndSink<S>>,
    on_element: Option<ArrayElementSink<S>>,
}

impl<S> ArrayBuilder<S> {
    /// Every element dispatches through the same callback.
    pub fn uniform(element: Callback<S>) -> Self {
        Self {
            elements: vec![element],
            select: |_, _| Some(0),
            on_begin: None,
            on_end: None,
            on_element: None,
        }
    }

    /// Dispatch through a fixed pool of callbacks, chosen per index by `select`.
    pub fn dispatch(elements: Vec<Callback<S>>, select: fn(usize, usize) -> Option<usize>) -> Self {
        Self {
            elements,
            select,
            on_begin: None,
            on_end: None,
            on_element: None,
        }
    }

    pub fn on_begin(mut self, sink: ArrayBeginSink<S>) -> Self {
        self.on_begin = Some(sink);
        self
    }

    pub fn on_end(mut self, sink: ArrayEndSink<S>) -> Self {
        self.on_end = Some(sink);
        self
    }

    /// Registers a sink invoked for every index, with `state` in hand, right
    /// before that element's own callback (if any) dispatches.
    pub fn on_element(mut self, sink: ArrayElementSink<S>) -> Self {
        self.on_element = Some(sink);
        self
    }

    pub fn build(self) -> ArrayCallback<S> {
        ArrayCallback {
            elements: self.elements,
            select: self.select,
            on_begin: self.on_begin,
            on_end: self.on_end,
            on_element: self.on_element,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "duplicate callback registration")]
    fn duplicate_field_panics() {
        struct S;
        let _ = ObjectBuilder::<S>::new()
            .text("a", |_s, _v| {})
            .text("a", |_s, _v| {});
    }

    #[test]
    fn builds_nested_object() {
        struct S(String);
        let tree: RecordCallback<S> = ObjectBuilder::new()
            .obj("continent", |b| b.text("code", |s: &mut S, v| s.0 = v.to_owned()))
            .build_record();
        assert!(tree.object().field("continent").is_some());
        assert!(tree.object().field("missing").is_none());
    }

    #[test]
    fn array_select_picks_pool_slot() {
        struct S;
        let arr = ArrayBuilder::dispatch(
            vec![
                Callback::Int(|_s: &mut S, _v| {}),
                Callback::Int(|_s, _v| {}),
            ],
            |i, _len| Some(i % 2),
        )
        .build();
        assert!(matches!(arr.element_for(0, 4), Some(Callback::Int(_))));
        assert!(matches!(arr.element_for(1, 4), Some(Callback::Int(_))));
    }
}
