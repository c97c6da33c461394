use crate::jvm::class_file::{
    Attribute, BytecodeArray, ClassConstantIndex, ClassFile, Code, ConstantsPool, Field,
    LineNumberTable, Method, SourceFile, Version,
};
use crate::jvm::code::{
    AssembledCode, Assembler, AssemblerSettings, BytecodeReader, MAX_CODE_LENGTH,
};
use crate::jvm::verifier::{MethodBody, VerifiedCode, Verifier};
use crate::jvm::{
    BinaryName, ClassAccessFlags, ClassHierarchy, ClassInfo, Error, FieldAccessFlags, FieldType,
    MethodAccessFlags, MethodDescriptor, Name, PoolSymbols, RefType, RenderDescriptor,
    UnqualifiedName,
};
use crate::util::Width;

/// Builder for a single class
///
/// Method bodies are assembled against the builder's constant pool (see
/// [`ClassBuilder::assembler`]) and then handed back through [`ClassBuilder::add_method`], which
/// verifies them and fills in their limits.
pub struct ClassBuilder {
    /// Class file version
    version: Version,

    settings: AssemblerSettings,

    /// Constants pool
    pub constants_pool: ConstantsPool,

    /// Class access flags
    access_flags: ClassAccessFlags,

    /// Class name
    this_class: BinaryName,

    /// Class name constant
    this_class_index: ClassConstantIndex,

    /// Superclass name constant
    super_class_index: ClassConstantIndex,

    /// Implemented interfaces constants
    interfaces: Vec<ClassConstantIndex>,

    fields: Vec<Field>,
    methods: Vec<Method>,
    attributes: Vec<Attribute>,

    /// Classes known to the verifier (including this one)
    hierarchy: ClassHierarchy,
}

impl ClassBuilder {
    /// Create a new class builder
    ///
    /// The class is registered in `hierarchy` so that methods can refer to it.
    pub fn new(
        access_flags: ClassAccessFlags,
        this_class: BinaryName,
        super_class: BinaryName,
        interfaces: Vec<BinaryName>,
        hierarchy: ClassHierarchy,
    ) -> Result<ClassBuilder, Error> {
        let info = if access_flags.contains(ClassAccessFlags::INTERFACE) {
            ClassInfo::interface(this_class.clone())
        } else {
            ClassInfo::class(this_class.clone(), super_class.clone())
        };
        hierarchy.add(info.implementing(interfaces.iter().cloned()));

        let mut constants_pool = ConstantsPool::new();
        let this_class_index = constants_pool.get_class(&RefType::Object(this_class.clone()))?;
        let super_class_index = constants_pool.get_class(&RefType::Object(super_class))?;
        let interfaces = interfaces
            .into_iter()
            .map(|interface| constants_pool.get_class(&RefType::Object(interface)))
            .collect::<Result<_, _>>()?;

        Ok(ClassBuilder {
            version: Version::default(),
            settings: AssemblerSettings::default(),
            constants_pool,
            access_flags,
            this_class,
            this_class_index,
            super_class_index,
            interfaces,
            fields: vec![],
            methods: vec![],
            attributes: vec![],
            hierarchy,
        })
    }

    pub fn with_version(mut self, version: Version) -> ClassBuilder {
        self.version = version;
        self
    }

    pub fn with_settings(mut self, settings: AssemblerSettings) -> ClassBuilder {
        self.settings = settings;
        self
    }

    pub fn class_name(&self) -> &BinaryName {
        &self.this_class
    }

    /// Classes known to the verifier
    ///
    /// More can be added through the shared reference.
    pub fn hierarchy(&self) -> &ClassHierarchy {
        &self.hierarchy
    }

    /// Start assembling a method body against this class' constants
    pub fn assembler(&mut self) -> Assembler<'_> {
        Assembler::new(&mut self.constants_pool, self.settings)
    }

    /// Add a field to the class
    pub fn add_field(
        &mut self,
        access_flags: FieldAccessFlags,
        name: &UnqualifiedName,
        descriptor: &FieldType,
    ) -> Result<(), Error> {
        let name_index = self.constants_pool.get_utf8(name.as_str())?;
        let descriptor_index = self.constants_pool.get_utf8(&descriptor.render())?;
        self.fields.push(Field {
            access_flags,
            name_index,
            descriptor_index,
            attributes: vec![],
        });
        Ok(())
    }

    /// Add a method with no body (`abstract` or `native`)
    pub fn add_abstract_method(
        &mut self,
        access_flags: MethodAccessFlags,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor,
    ) -> Result<(), Error> {
        let name_index = self.constants_pool.get_utf8(name.as_str())?;
        let descriptor_index = self.constants_pool.get_utf8(&descriptor.render())?;
        self.methods.push(Method {
            access_flags,
            name_index,
            descriptor_index,
            attributes: vec![],
        });
        Ok(())
    }

    /// Add a method along with its assembled body
    ///
    /// Unless verification is turned off in the settings, the body is verified first and the
    /// `Code` attribute gets the computed limits. Otherwise, limits are estimated from the
    /// instructions.
    pub fn add_method(
        &mut self,
        access_flags: MethodAccessFlags,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor,
        code: AssembledCode,
    ) -> Result<VerifiedCode, Error> {
        let is_static = access_flags.contains(MethodAccessFlags::STATIC);
        if code.code.len() > MAX_CODE_LENGTH {
            return Err(Error::CodeOverflow(code.code.len()));
        }

        let limits = if self.settings.verify {
            let body = MethodBody {
                class: &self.this_class,
                is_static,
                name,
                descriptor,
                code: &code.code,
                exception_table: &code.exception_table,
                labels: Some(&code.labels),
            };
            let symbols = PoolSymbols::new(&self.constants_pool, &self.hierarchy);
            Verifier::verify(&body, &symbols)?
        } else {
            estimated_limits(is_static, descriptor, &code.code)?
        };
        log::debug!(
            "adding {}.{}{} (max stack {}, max locals {})",
            self.this_class,
            name,
            descriptor.render(),
            limits.max_stack,
            limits.max_locals
        );

        let mut code_attributes = vec![];
        if !code.line_numbers.is_empty() {
            let table = LineNumberTable(code.line_numbers);
            code_attributes.push(self.constants_pool.get_attribute(table)?);
        }
        let code = Code {
            max_stack: limits.max_stack,
            max_locals: limits.max_locals,
            code_array: BytecodeArray(code.code),
            exception_table: code.exception_table,
            attributes: code_attributes,
        };

        let name_index = self.constants_pool.get_utf8(name.as_str())?;
        let descriptor_index = self.constants_pool.get_utf8(&descriptor.render())?;
        let code = self.constants_pool.get_attribute(code)?;
        self.methods.push(Method {
            access_flags,
            name_index,
            descriptor_index,
            attributes: vec![code],
        });
        Ok(limits)
    }

    /// Record the name of the source file the class was compiled from
    pub fn set_source_file(&mut self, file_name: &str) -> Result<(), Error> {
        let file_name = self.constants_pool.get_utf8(file_name)?;
        let attribute = self.constants_pool.get_attribute(SourceFile(file_name))?;
        self.attributes.push(attribute);
        Ok(())
    }

    /// Consume the builder and return the class file
    pub fn result(self) -> ClassFile {
        ClassFile {
            version: self.version,
            constants: self.constants_pool,
            access_flags: self.access_flags,
            this_class: self.this_class_index,
            super_class: Some(self.super_class_index),
            interfaces: self.interfaces,
            fields: self.fields,
            methods: self.methods,
            attributes: self.attributes,
        }
    }
}

/// Upper bounds on the limits of unverified code
///
/// No instruction grows the stack by more than two slots, and handlers start with one.
fn estimated_limits(
    is_static: bool,
    descriptor: &MethodDescriptor,
    code: &[u8],
) -> Result<VerifiedCode, Error> {
    let mut max_locals = descriptor.parameter_length(!is_static);
    let mut instructions = 0;
    for insn in BytecodeReader::new(code) {
        let insn = insn?;
        instructions += 1;
        if let Some(local) = insn.local() {
            let width = if insn.mnemonic().starts_with('l') || insn.mnemonic().starts_with('d') {
                FieldType::long().width()
            } else {
                1
            };
            max_locals = max_locals.max(local as usize + width);
        }
    }
    Ok(VerifiedCode {
        max_stack: (2 * instructions + 1).min(u16::MAX as usize) as u16,
        max_locals: max_locals.min(u16::MAX as usize) as u16,
    })
}
