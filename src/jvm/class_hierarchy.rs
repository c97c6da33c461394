use crate::jvm::{BinaryName, RefType};
use elsa::FrozenMap;
use std::cmp::Ordering;
use std::collections::HashSet;

/// What the verifier needs to know about a class it did not assemble itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: BinaryName,

    /// `None` only for `java/lang/Object`
    pub superclass: Option<BinaryName>,

    pub interfaces: Vec<BinaryName>,
    pub is_interface: bool,
}

impl ClassInfo {
    pub fn class(name: BinaryName, superclass: BinaryName) -> ClassInfo {
        ClassInfo {
            name,
            superclass: Some(superclass),
            interfaces: vec![],
            is_interface: false,
        }
    }

    pub fn interface(name: BinaryName) -> ClassInfo {
        ClassInfo {
            name,
            superclass: Some(BinaryName::OBJECT),
            interfaces: vec![],
            is_interface: true,
        }
    }

    pub fn implementing(mut self, interfaces: impl IntoIterator<Item = BinaryName>) -> ClassInfo {
        self.interfaces.extend(interfaces);
        self
    }
}

/// Append-only table of known classes
///
/// Classes can be added through a shared reference (eg. while a verifier is holding on to the
/// hierarchy) but never removed or replaced.
pub struct ClassHierarchy {
    classes: FrozenMap<BinaryName, Box<ClassInfo>>,
}

impl ClassHierarchy {
    /// Empty hierarchy (not even `java/lang/Object`)
    pub fn new() -> ClassHierarchy {
        ClassHierarchy {
            classes: FrozenMap::new(),
        }
    }

    /// Hierarchy pre-populated with the core `java.lang` types
    pub fn with_java_lang() -> ClassHierarchy {
        let hierarchy = ClassHierarchy::new();
        hierarchy.add(ClassInfo {
            name: BinaryName::OBJECT,
            superclass: None,
            interfaces: vec![],
            is_interface: false,
        });
        for interface in [
            BinaryName::SERIALIZABLE,
            BinaryName::CLONEABLE,
            BinaryName::COMPARABLE,
            BinaryName::CHARSEQUENCE,
        ] {
            hierarchy.add(ClassInfo::interface(interface));
        }
        hierarchy.add(
            ClassInfo::class(BinaryName::STRING, BinaryName::OBJECT).implementing([
                BinaryName::SERIALIZABLE,
                BinaryName::COMPARABLE,
                BinaryName::CHARSEQUENCE,
            ]),
        );
        hierarchy.add(ClassInfo::class(BinaryName::CLASS, BinaryName::OBJECT));
        hierarchy.add(ClassInfo::class(BinaryName::SYSTEM, BinaryName::OBJECT));
        hierarchy.add(
            ClassInfo::class(BinaryName::NUMBER, BinaryName::OBJECT)
                .implementing([BinaryName::SERIALIZABLE]),
        );
        hierarchy.add(
            ClassInfo::class(BinaryName::INTEGER, BinaryName::NUMBER)
                .implementing([BinaryName::COMPARABLE]),
        );
        hierarchy.add(
            ClassInfo::class(BinaryName::THROWABLE, BinaryName::OBJECT)
                .implementing([BinaryName::SERIALIZABLE]),
        );
        hierarchy.add(ClassInfo::class(BinaryName::ERROR, BinaryName::THROWABLE));
        hierarchy.add(ClassInfo::class(BinaryName::EXCEPTION, BinaryName::THROWABLE));
        hierarchy.add(ClassInfo::class(
            BinaryName::RUNTIMEEXCEPTION,
            BinaryName::EXCEPTION,
        ));
        hierarchy.add(ClassInfo::class(
            BinaryName::ARITHMETICEXCEPTION,
            BinaryName::RUNTIMEEXCEPTION,
        ));
        hierarchy
    }

    /// Register a class, returning the registered information
    ///
    /// If the class was already known, the existing information is kept.
    pub fn add(&self, class: ClassInfo) -> &ClassInfo {
        match self.classes.get(&class.name) {
            Some(existing) => existing,
            None => self.classes.insert(class.name.clone(), Box::new(class)),
        }
    }

    pub fn get(&self, name: &BinaryName) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    pub fn is_interface(&self, name: &BinaryName) -> bool {
        self.get(name).map_or(false, |class| class.is_interface)
    }

    /// Is the first class a subclass (or the same class) as the second?
    ///
    /// Assignment to an interface always succeeds, matching the type-inference verifier. Unknown
    /// classes are only assignable to themselves and to `java/lang/Object`.
    pub fn is_class_assignable(&self, sub_type: &BinaryName, super_type: &BinaryName) -> bool {
        if sub_type == super_type || super_type == &BinaryName::OBJECT {
            return true;
        }
        if self.is_interface(super_type) {
            return true;
        }

        let mut to_visit: Vec<&BinaryName> = vec![sub_type];
        let mut seen: HashSet<&BinaryName> = HashSet::new();
        seen.insert(sub_type);
        while let Some(class_name) = to_visit.pop() {
            if class_name == super_type {
                return true;
            }
            if let Some(superclass) = self.get(class_name).and_then(|c| c.superclass.as_ref()) {
                if seen.insert(superclass) {
                    to_visit.push(superclass);
                }
            }
        }
        false
    }

    /// Assignability of reference types, including the array covariance rules
    pub fn is_assignable(&self, sub_type: &RefType, super_type: &RefType) -> bool {
        match (sub_type, super_type) {
            (RefType::Object(cls1), RefType::Object(cls2)) => self.is_class_assignable(cls1, cls2),

            // Arrays only have `Object`, `Cloneable`, and `Serializable` as super types
            (RefType::PrimitiveArray(_) | RefType::ObjectArray(_), RefType::Object(cls)) => {
                is_array_super_type(cls)
            }

            (RefType::PrimitiveArray(arr1), RefType::PrimitiveArray(arr2)) => arr1 == arr2,

            (RefType::PrimitiveArray(arr1), RefType::ObjectArray(arr2)) => {
                arr1.additional_dimensions > arr2.additional_dimensions
                    && is_array_super_type(&arr2.element_type)
            }

            (RefType::ObjectArray(arr1), RefType::ObjectArray(arr2)) => {
                match arr1.additional_dimensions.cmp(&arr2.additional_dimensions) {
                    Ordering::Less => false,
                    Ordering::Equal => {
                        self.is_class_assignable(&arr1.element_type, &arr2.element_type)
                    }
                    Ordering::Greater => is_array_super_type(&arr2.element_type),
                }
            }

            _ => false,
        }
    }
}

impl Default for ClassHierarchy {
    fn default() -> ClassHierarchy {
        ClassHierarchy::with_java_lang()
    }
}

fn is_array_super_type(super_type: &BinaryName) -> bool {
    super_type == &BinaryName::OBJECT
        || super_type == &BinaryName::CLONEABLE
        || super_type == &BinaryName::SERIALIZABLE
}
