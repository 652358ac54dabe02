//! Task model unit tests

use crate::task::{
    ComputingNodes, ConstraintValue, CoreElement, CoreElementRegistry, DataType, DescriptorError,
    Direction, ImplementationKind, ParamSpec, Parameter, Stream, TaskBuilder, DEFAULT_PREFIX,
};
use crate::value::{Obj, Record, Value, ValueKind};

#[cfg(test)]
mod parameter_tests {
    use super::*;

    #[test]
    fn test_type_codes_round_trip() {
        for ty in [
            DataType::Boolean,
            DataType::Char,
            DataType::Int,
            DataType::Long,
            DataType::Double,
            DataType::String,
            DataType::File,
            DataType::Object,
            DataType::ExternalPersistent,
        ] {
            assert_eq!(DataType::from_code(ty.code()), Some(ty));
        }
        assert_eq!(DataType::File.code(), 9);
        assert_eq!(DataType::ExternalPersistent.code(), 12);
        assert_eq!(DataType::from_code(3), None);
    }

    #[test]
    fn test_direction_and_stream_codes() {
        assert_eq!(Direction::InOut.code(), 2);
        assert_eq!(Direction::from_code(1), Some(Direction::Out));
        assert_eq!(Direction::from_code(7), None);
        assert_eq!(Stream::Unspecified.code(), 3);
        assert_eq!(Stream::from_code(0), Some(Stream::Stdin));
    }

    #[test]
    fn test_direction_from_mode() {
        assert_eq!(Direction::from_mode("r"), Direction::In);
        assert_eq!(Direction::from_mode("w"), Direction::Out);
        assert_eq!(Direction::from_mode("wb"), Direction::Out);
        assert_eq!(Direction::from_mode("a"), Direction::InOut);
        assert_eq!(Direction::from_mode("r+"), Direction::InOut);
        assert_eq!(Direction::from_mode("x"), Direction::In);
    }

    #[test]
    fn test_infer_precedence() {
        assert_eq!(DataType::infer(&Value::Bool(true)), DataType::Boolean);
        assert_eq!(DataType::infer(&Value::from("a")), DataType::Char);
        assert_eq!(DataType::infer(&Value::from("ab")), DataType::String);
        assert_eq!(DataType::infer(&Value::from("")), DataType::String);
        assert_eq!(DataType::infer(&Value::Int(1)), DataType::Int);
        assert_eq!(DataType::infer(&Value::Float(1.0)), DataType::Double);
        assert_eq!(DataType::infer(&Value::list([1])), DataType::Object);
        assert_eq!(DataType::infer(&Value::None), DataType::Object);
    }

    #[test]
    fn test_infer_persistent_record() {
        let mut record = Record::new("Person");
        assert_eq!(DataType::infer(&Value::Record(record.clone())), DataType::Object);
        record.storage_id = Some("id-1".to_string());
        assert_eq!(DataType::infer(&Value::Record(record)), DataType::ExternalPersistent);
    }

    #[test]
    fn test_parameter_from_spec() {
        let declared = Parameter::from_spec("f", &ParamSpec::file(Direction::Out), Obj::new("out.txt"));
        assert_eq!(declared.data_type, DataType::File);
        assert_eq!(declared.direction, Direction::Out);
        assert_eq!(declared.prefix, DEFAULT_PREFIX);

        let inferred = Parameter::from_spec("x", &ParamSpec::inout().prefix("-x"), Obj::new(3));
        assert_eq!(inferred.data_type, DataType::Int);
        assert_eq!(inferred.prefix, "-x");
        assert!(inferred.live().is_some());
    }
}

#[cfg(test)]
mod descriptor_tests {
    use super::*;

    #[test]
    fn test_plain_function_descriptor() {
        let task = TaskBuilder::new("app", "increment")
            .param("x", ParamSpec::input())
            .returns(1)
            .build()
            .unwrap();
        assert_eq!(task.signature(), "app.increment");
        assert_eq!(task.core_element.impl_args, vec!["app", "increment"]);
        assert_eq!(task.core_element.kind, ImplementationKind::Method);
        assert!(!task.has_target());
        assert_eq!(task.num_returns(), 1);
        assert_eq!(task.computing_nodes, 1);
    }

    #[test]
    fn test_instance_method_signature() {
        let task = TaskBuilder::new("app", "grow")
            .instance_method("Counter")
            .build()
            .unwrap();
        assert_eq!(task.signature(), "app.Counter.grow");
        assert_eq!(task.core_element.impl_args, vec!["app.Counter", "grow"]);
        assert!(task.has_target());
        assert!(task.modifier);
    }

    #[test]
    fn test_class_method_has_no_target() {
        let task = TaskBuilder::new("app", "make")
            .class_method("Counter")
            .build()
            .unwrap();
        assert_eq!(task.signature(), "app.Counter.make");
        assert!(!task.has_target());
    }

    #[test]
    fn test_duplicate_parameter() {
        let err = TaskBuilder::new("app", "f")
            .param("a", ParamSpec::input())
            .param("a", ParamSpec::inout())
            .build()
            .unwrap_err();
        assert_eq!(err, DescriptorError::DuplicateParameter("a".to_string()));
    }

    #[test]
    fn test_mpi_layer() {
        let task = TaskBuilder::new("app", "solve")
            .mpi("solver.x", "mpirun", None, 4u32)
            .constraint("ComputingUnits", 2u32)
            .build()
            .unwrap();
        let ce = &task.core_element;
        assert_eq!(ce.kind, ImplementationKind::Mpi);
        assert_eq!(ce.impl_signature, "MPI.solver.x");
        assert_eq!(ce.impl_args, vec!["solver.x", "[unassigned]", "mpirun"]);
        assert_eq!(ce.signature, "app.solve");
        assert_eq!(task.computing_nodes, 4);
        assert_eq!(ce.constraints_string(), "ComputingUnits:2;");
    }

    #[test]
    fn test_binary_layer_keeps_working_dir() {
        let task = TaskBuilder::new("app", "ls")
            .binary("/bin/ls", Some("/tmp"))
            .build()
            .unwrap();
        assert_eq!(task.core_element.impl_signature, "BINARY./bin/ls");
        assert_eq!(task.core_element.impl_args, vec!["/bin/ls", "/tmp"]);
    }

    #[test]
    fn test_implement_layer_renames_signature() {
        let task = TaskBuilder::new("app", "fast_sort")
            .implement("app.Sorter", "sort")
            .build()
            .unwrap();
        assert_eq!(task.signature(), "app.Sorter.sort");
        assert_eq!(task.core_element.impl_signature, "app.fast_sort");
    }

    #[test]
    fn test_computing_nodes_from_env() {
        std::env::set_var("TASKBIND_TEST_NODES_A", "8");
        assert_eq!(ComputingNodes::from("$TASKBIND_TEST_NODES_A").resolve(), Ok(8));
        assert_eq!(ComputingNodes::from("${TASKBIND_TEST_NODES_A}").resolve(), Ok(8));
        assert_eq!(ComputingNodes::from("3").resolve(), Ok(3));
    }

    #[test]
    fn test_computing_nodes_errors() {
        assert_eq!(
            ComputingNodes::from("$TASKBIND_TEST_NODES_UNSET").resolve(),
            Err(DescriptorError::MissingEnv("TASKBIND_TEST_NODES_UNSET".to_string()))
        );
        assert!(matches!(
            ComputingNodes::from("many").resolve(),
            Err(DescriptorError::InvalidComputingNodes(_))
        ));
    }

    #[test]
    fn test_typed_returns() {
        let task = TaskBuilder::new("app", "split")
            .returns_typed([ValueKind::List, ValueKind::Int])
            .build()
            .unwrap();
        assert_eq!(task.returns, vec![ValueKind::List, ValueKind::Int]);
    }
}

#[cfg(test)]
mod core_element_tests {
    use super::*;

    #[test]
    fn test_constraints_string_formats_lists() {
        let mut ce = CoreElement::method("app", None, "f");
        ce.constraints
            .insert("ComputingUnits".to_string(), ConstraintValue::from(2u32));
        ce.constraints.insert(
            "ProcessorArchitecture".to_string(),
            ConstraintValue::from(vec!["x86", "arm"]),
        );
        assert_eq!(
            ce.constraints_string(),
            "ComputingUnits:2;ProcessorArchitecture:[x86, arm];"
        );
    }

    #[test]
    fn test_registry_is_idempotent() {
        let registry = CoreElementRegistry::new();
        let ce = CoreElement::method("app", None, "f");
        assert!(registry.register(&ce));
        assert!(!registry.register(&ce));
        assert!(registry.contains("app.f"));
        assert_eq!(registry.len(), 1);
        registry.clear();
        assert!(registry.is_empty());
    }
}
