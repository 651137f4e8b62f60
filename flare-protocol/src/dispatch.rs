//! Opcode-indexed handler registry shared by the transport and application
//! layers.
//!
//! A [`DispatchTable`] maps a one-byte opcode to a factory producing a boxed
//! handler. Tables are assembled once through [`DispatchTableBuilder`] and
//! expose no mutation API afterwards, so they can be shared between
//! connections without locking.

use crate::error::ProtocolError;

/// Produces a fresh handler for one dispatch.
pub type HandlerFactory<H> = fn() -> Box<H>;

/// Immutable opcode → handler factory map.
///
/// Lookup is a direct index into a 256-slot array.
pub struct DispatchTable<H: ?Sized> {
    slots: [Option<HandlerFactory<H>>; 256],
    len: usize,
}

impl<H: ?Sized> DispatchTable<H> {
    /// Starts building a new table.
    pub fn builder() -> DispatchTableBuilder<H> {
        DispatchTableBuilder {
            slots: [None; 256],
            len: 0,
        }
    }

    /// Returns the factory registered for `opcode`, if any.
    pub fn factory(&self, opcode: u8) -> Option<HandlerFactory<H>> {
        self.slots[opcode as usize]
    }

    /// Instantiates the handler registered for `opcode`.
    pub fn resolve(&self, opcode: u8) -> Option<Box<H>> {
        self.factory(opcode).map(|factory| factory())
    }

    /// Returns whether a handler is registered for `opcode`.
    pub fn contains(&self, opcode: u8) -> bool {
        self.slots[opcode as usize].is_some()
    }

    /// Returns the registered opcodes in ascending order.
    pub fn opcodes(&self) -> Vec<u8> {
        (0..=u8::MAX).filter(|op| self.contains(*op)).collect()
    }

    /// Returns the number of registered opcodes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<H: ?Sized> std::fmt::Debug for DispatchTable<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTable")
            .field("opcodes", &self.opcodes())
            .finish()
    }
}

/// Builder for [`DispatchTable`]. Consumed by [`build`](Self::build).
pub struct DispatchTableBuilder<H: ?Sized> {
    slots: [Option<HandlerFactory<H>>; 256],
    len: usize,
}

impl<H: ?Sized> DispatchTableBuilder<H> {
    /// Registers `factory` for `opcode`.
    ///
    /// Each opcode accepts at most one handler.
    pub fn register(
        mut self,
        opcode: u8,
        factory: HandlerFactory<H>,
    ) -> Result<Self, ProtocolError> {
        let slot = &mut self.slots[opcode as usize];
        if slot.is_some() {
            return Err(ProtocolError::DuplicateOpcode { opcode });
        }
        *slot = Some(factory);
        self.len += 1;
        Ok(self)
    }

    /// Freezes the table.
    pub fn build(self) -> DispatchTable<H> {
        DispatchTable {
            slots: self.slots,
            len: self.len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter {
        fn greet(&self) -> &'static str;
    }

    struct Hello;
    struct Bye;

    impl Greeter for Hello {
        fn greet(&self) -> &'static str {
            "hello"
        }
    }

    impl Greeter for Bye {
        fn greet(&self) -> &'static str {
            "bye"
        }
    }

    fn hello() -> Box<dyn Greeter> {
        Box::new(Hello)
    }

    fn bye() -> Box<dyn Greeter> {
        Box::new(Bye)
    }

    #[test]
    fn test_resolve_registered() {
        let table = DispatchTable::<dyn Greeter>::builder()
            .register(1, hello)
            .unwrap()
            .register(0xff, bye)
            .unwrap()
            .build();

        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve(1).unwrap().greet(), "hello");
        assert_eq!(table.resolve(0xff).unwrap().greet(), "bye");
        assert_eq!(table.opcodes(), vec![1, 0xff]);
    }

    #[test]
    fn test_resolve_miss() {
        let table = DispatchTable::<dyn Greeter>::builder()
            .register(1, hello)
            .unwrap()
            .build();

        assert!(table.resolve(0).is_none());
        assert!(table.resolve(2).is_none());
        assert!(!table.contains(2));
    }

    #[test]
    fn test_duplicate_opcode_rejected() {
        let result = DispatchTable::<dyn Greeter>::builder()
            .register(7, hello)
            .unwrap()
            .register(7, bye);

        assert!(matches!(
            result,
            Err(ProtocolError::DuplicateOpcode { opcode: 7 })
        ));
    }

    #[test]
    fn test_empty_table() {
        let table = DispatchTable::<dyn Greeter>::builder().build();
        assert!(table.is_empty());
        assert!(table.opcodes().is_empty());
    }
}
