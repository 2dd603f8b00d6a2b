use crate::lang::{ClassDecl, Expr, FunctionDecl, Type};
use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo<'a> {
    pub ty: Type,
    /// Word offset from the instance pointer.
    pub offset: usize,
    /// Value stored by `new` before `init` runs.
    pub init: Option<&'a Expr>,
}

#[derive(Debug, Clone)]
pub struct ClassInfo<'a> {
    pub name: String,
    pub decl: &'a ClassDecl,
    pub fields: IndexMap<String, FieldInfo<'a>>,
    pub methods: IndexMap<String, &'a FunctionDecl>,
}

impl<'a> ClassInfo<'a> {
    pub fn field(&self, name: &str) -> Option<&FieldInfo<'a>> {
        self.fields.get(name)
    }

    pub fn method(&self, name: &str) -> Option<&'a FunctionDecl> {
        self.methods.get(name).copied()
    }

    /// The constructor, if the class declares one.
    pub fn init(&self) -> Option<&'a FunctionDecl> {
        self.method("init")
    }

    /// Instance size in words.
    pub fn size(&self) -> usize {
        self.fields.len()
    }
}

/// Registered classes, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ClassTable<'a> {
    classes: IndexMap<String, ClassInfo<'a>>,
}

impl<'a> ClassTable<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ClassInfo<'a>> {
        self.classes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Class of a value of type `ty`, if it is a registered class type.
    pub fn of_type(&self, ty: &Type) -> Option<&ClassInfo<'a>> {
        ty.class_name().and_then(|name| self.get(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassInfo<'a>> {
        self.classes.values()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub(crate) fn insert(&mut self, info: ClassInfo<'a>) {
        self.classes.insert(info.name.clone(), info);
    }
}
