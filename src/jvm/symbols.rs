use crate::jvm::class_file::{Constant, ConstantsPool};
use crate::jvm::{
    BinaryName, ClassHierarchy, Error, FieldType, MethodDescriptor, Name, ParseDescriptor,
    RefType, RenderDescriptor, UnqualifiedName,
};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Symbolic reference to a field
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FieldRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
}

impl FieldRef {
    pub fn new(class: BinaryName, name: UnqualifiedName, descriptor: FieldType) -> FieldRef {
        FieldRef {
            class,
            name,
            descriptor,
        }
    }
}

impl Display for FieldRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}.{}:{}", self.class, self.name, self.descriptor.render())
    }
}

/// Symbolic reference to a method (or interface method)
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
    pub is_interface: bool,
}

impl MethodRef {
    pub fn new(class: BinaryName, name: UnqualifiedName, descriptor: MethodDescriptor) -> MethodRef {
        MethodRef {
            class,
            name,
            descriptor,
            is_interface: false,
        }
    }

    pub fn interface(
        class: BinaryName,
        name: UnqualifiedName,
        descriptor: MethodDescriptor,
    ) -> MethodRef {
        MethodRef {
            class,
            name,
            descriptor,
            is_interface: true,
        }
    }

    pub fn is_constructor(&self) -> bool {
        self.name == UnqualifiedName::INIT
    }
}

impl Display for MethodRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}.{}:{}", self.class, self.name, self.descriptor.render())
    }
}

/// Value pushed by `ldc`, `ldc_w`, and `ldc2_w`
#[derive(Clone, PartialEq, Debug)]
pub enum LoadableConstant {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    Class(RefType),
    MethodType(MethodDescriptor),
    MethodHandle,
}

impl LoadableConstant {
    /// Static type of the value pushed onto the stack
    pub fn field_type(&self) -> FieldType {
        match self {
            LoadableConstant::Integer(_) => FieldType::int(),
            LoadableConstant::Float(_) => FieldType::float(),
            LoadableConstant::Long(_) => FieldType::long(),
            LoadableConstant::Double(_) => FieldType::double(),
            LoadableConstant::String(_) => FieldType::object(BinaryName::STRING),
            LoadableConstant::Class(_) => FieldType::object(BinaryName::CLASS),
            LoadableConstant::MethodType(_) => FieldType::object(BinaryName::METHODTYPE),
            LoadableConstant::MethodHandle => FieldType::object(BinaryName::METHODHANDLE),
        }
    }
}

impl Display for LoadableConstant {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            LoadableConstant::Integer(i) => write!(f, "{}", i),
            LoadableConstant::Float(x) => write!(f, "{:?}f", x),
            LoadableConstant::Long(l) => write!(f, "{}L", l),
            LoadableConstant::Double(d) => write!(f, "{:?}", d),
            LoadableConstant::String(s) => write!(f, "{:?}", s),
            LoadableConstant::Class(cls) => write!(f, "{}.class", cls),
            LoadableConstant::MethodType(desc) => write!(f, "MethodType {}", desc.render()),
            LoadableConstant::MethodHandle => f.write_str("MethodHandle"),
        }
    }
}

/// What a constant pool index refers to
#[derive(Clone, PartialEq, Debug)]
pub enum Symbol {
    Field(FieldRef),
    Method(MethodRef),
    Class(RefType),
    Constant(LoadableConstant),
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Symbol::Field(field) => field.fmt(f),
            Symbol::Method(method) => method.fmt(f),
            Symbol::Class(class) => class.fmt(f),
            Symbol::Constant(constant) => constant.fmt(f),
        }
    }
}

/// Capability for looking up symbols referenced from bytecode
///
/// The verifier and disassembler only ever see constant pool indices; this is how they find out
/// what field, method, class, or constant the index denotes, and how classes relate.
pub trait SymbolResolver {
    /// Resolve a constant pool index
    fn resolve(&self, index: u16) -> Result<Symbol, Error>;

    /// Is the first reference type assignable to the second?
    fn is_assignable(&self, sub_type: &RefType, super_type: &RefType) -> bool;

    /// Is the class known to be an interface?
    fn is_interface(&self, class: &BinaryName) -> bool;

    /// Direct superclass, if the class is known and has one
    fn superclass(&self, class: &BinaryName) -> Option<BinaryName>;

    /// Class declaring a field or method
    fn declaring_class<'a>(&self, member: &'a Symbol) -> Option<&'a BinaryName> {
        match member {
            Symbol::Field(field) => Some(&field.class),
            Symbol::Method(method) => Some(&method.class),
            Symbol::Class(_) | Symbol::Constant(_) => None,
        }
    }
}

/// Resolver backed by a constant pool and a class hierarchy
pub struct PoolSymbols<'a> {
    pub constants: &'a ConstantsPool,
    pub hierarchy: &'a ClassHierarchy,
}

impl<'a> PoolSymbols<'a> {
    pub fn new(constants: &'a ConstantsPool, hierarchy: &'a ClassHierarchy) -> PoolSymbols<'a> {
        PoolSymbols {
            constants,
            hierarchy,
        }
    }

    fn member_name_and_type(&self, index: u16) -> Result<(UnqualifiedName, &'a str), Error> {
        let (name, descriptor) = self.constants.name_and_type(index)?;
        let name = UnqualifiedName::from_string(name.to_owned()).map_err(Error::MalformedName)?;
        Ok((name, descriptor))
    }

    fn class_name(&self, index: u16) -> Result<BinaryName, Error> {
        match self.constants.class(index)? {
            RefType::Object(name) => Ok(name),
            // Methods like `clone` can be invoked on array types
            _ => Ok(BinaryName::OBJECT),
        }
    }
}

impl<'a> SymbolResolver for PoolSymbols<'a> {
    fn resolve(&self, index: u16) -> Result<Symbol, Error> {
        Ok(match self.constants.get(index)? {
            Constant::Class(_) => Symbol::Class(self.constants.class(index)?),
            Constant::FieldRef(class, name_and_type) => {
                let (name, descriptor) = self.member_name_and_type(name_and_type.0 .0)?;
                Symbol::Field(FieldRef {
                    class: self.class_name(class.0 .0)?,
                    name,
                    descriptor: FieldType::parse(descriptor)?,
                })
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                let (name, descriptor) = self.member_name_and_type(name_and_type.0 .0)?;
                Symbol::Method(MethodRef {
                    class: self.class_name(class.0 .0)?,
                    name,
                    descriptor: MethodDescriptor::parse(descriptor)?,
                    is_interface: *is_interface,
                })
            }
            Constant::Integer(i) => Symbol::Constant(LoadableConstant::Integer(*i)),
            Constant::Float(x) => Symbol::Constant(LoadableConstant::Float(*x)),
            Constant::Long(l) => Symbol::Constant(LoadableConstant::Long(*l)),
            Constant::Double(d) => Symbol::Constant(LoadableConstant::Double(*d)),
            Constant::String(utf8) => {
                let string = self.constants.utf8(utf8.0 .0)?;
                Symbol::Constant(LoadableConstant::String(string.to_owned()))
            }
            Constant::MethodType { descriptor } => {
                let descriptor = self.constants.utf8(descriptor.0 .0)?;
                let descriptor = MethodDescriptor::parse(descriptor)?;
                Symbol::Constant(LoadableConstant::MethodType(descriptor))
            }
            Constant::MethodHandle { .. } => Symbol::Constant(LoadableConstant::MethodHandle),
            other => {
                return Err(Error::UnexpectedConstant {
                    index,
                    expected: "a field, method, class, or loadable constant",
                    found: format!("{:?}", other),
                })
            }
        })
    }

    fn is_assignable(&self, sub_type: &RefType, super_type: &RefType) -> bool {
        self.hierarchy.is_assignable(sub_type, super_type)
    }

    fn is_interface(&self, class: &BinaryName) -> bool {
        self.hierarchy.is_interface(class)
    }

    fn superclass(&self, class: &BinaryName) -> Option<BinaryName> {
        self.hierarchy
            .get(class)
            .and_then(|info| info.superclass.clone())
    }
}
