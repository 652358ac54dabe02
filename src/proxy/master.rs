//! Submitting side of a task call
//!
//! [`Binding::call`] turns one invocation of a task function into a
//! [`Submission`]: bind arguments to the declared parameters, marshal them,
//! mint futures for the declared returns, and hand everything to the
//! runtime. Wire order is parameters, returns, then the target.

use crate::binding::Binding;
use crate::error::{MarshalError, Result};
use crate::runtime::Submission;
use crate::task::{
    DataType, Direction, ParamSpec, ParamValue, Parameter, Stream, TaskDescriptor, RETURN_PREFIX,
};
use crate::value::{Obj, Value};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use tracing::debug;

/// Name of the target parameter of instance methods
pub const TARGET_NAME: &str = "self";

/// Name of the single return parameter; multiple returns get an index suffix
pub const RETURN_NAME: &str = "compss_retvalue";

/// Actual arguments of one task call
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub target: Option<Obj>,
    pub args: Vec<Obj>,
    pub kwargs: IndexMap<String, Obj>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instance the method is called on
    pub fn target(
        mut self,
        target: impl Into<Obj>,
    ) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn arg(
        mut self,
        value: impl Into<Obj>,
    ) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn args<I, T>(
        mut self,
        values: I,
    ) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Obj>,
    {
        self.args.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn kwarg(
        mut self,
        name: impl Into<String>,
        value: impl Into<Obj>,
    ) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }
}

/// Futures handed back for a call's declared returns
#[derive(Debug, Clone)]
pub enum Returned {
    One(Obj),
    Many(Vec<Obj>),
}

impl Returned {
    pub fn into_one(self) -> Option<Obj> {
        match self {
            Returned::One(obj) => Some(obj),
            Returned::Many(objs) => objs.into_iter().next(),
        }
    }

    pub fn into_vec(self) -> Vec<Obj> {
        match self {
            Returned::One(obj) => vec![obj],
            Returned::Many(objs) => objs,
        }
    }
}

impl Binding {
    /// Submit one call of `task`.
    ///
    /// Returns the futures of the declared returns, or `None` when the task
    /// declares none.
    pub fn call(
        &mut self,
        task: &TaskDescriptor,
        call: CallArgs,
    ) -> Result<Option<Returned>> {
        self.ensure_running()?;
        self.register(task)?;

        let CallArgs {
            target,
            args,
            mut kwargs,
        } = call;
        let mut params = bind_arguments(task, args, &mut kwargs, self.config.args_as_tuple)?;
        if let Some(name) = &task.kwargs {
            let map: BTreeMap<String, Obj> = kwargs.into_iter().collect();
            params.push(Parameter::input(format!("**{}", name), Obj::new(Value::Map(map))));
        } else if let Some((name, _)) = kwargs.first() {
            return Err(MarshalError::UnexpectedKeyword(name.clone()).into());
        }

        let mut budget = self.config.max_inline_bytes;
        let mut marshalled = Vec::with_capacity(params.len() + task.num_returns() + 1);
        for (position, param) in params.into_iter().enumerate() {
            marshalled.push(self.marshal_parameter(position, param, &mut budget)?);
        }

        let target_param = if task.has_target() {
            let target = target.ok_or_else(|| MarshalError::MissingTarget(task.signature().to_string()))?;
            let direction = if task.modifier {
                Direction::InOut
            } else {
                Direction::In
            };
            let spec = ParamSpec::new().direction(direction);
            let param = Parameter::from_spec(TARGET_NAME, &spec, target);
            let position = marshalled.len();
            Some(self.marshal_parameter(position, param, &mut budget)?)
        } else {
            None
        };

        let mut futures = Vec::with_capacity(task.num_returns());
        let multi = task.num_returns() > 1;
        for (i, kind) in task.returns.iter().enumerate() {
            let (future, path) = self.mint_future(kind)?;
            let name = if multi {
                format!("{}{}", RETURN_NAME, i)
            } else {
                RETURN_NAME.to_string()
            };
            marshalled.push(Parameter {
                name,
                data_type: DataType::File,
                direction: Direction::Out,
                stream: Stream::Unspecified,
                prefix: RETURN_PREFIX.to_string(),
                value: ParamValue::File(path),
            });
            futures.push(future);
        }
        marshalled.extend(target_param);

        let submission = self.build_submission(task, &marshalled);
        self.runtime.process_task(submission)?;

        Ok(match futures.len() {
            0 => None,
            1 => futures.pop().map(Returned::One),
            _ => Some(Returned::Many(futures)),
        })
    }

    fn build_submission(
        &self,
        task: &TaskDescriptor,
        params: &[Parameter],
    ) -> Submission {
        let submission = Submission {
            app_id: self.config.app_id,
            signature: task.signature().to_string(),
            priority: task.priority,
            num_nodes: task.computing_nodes,
            replicated: task.replicated,
            distributed: task.distributed,
            has_target: task.has_target(),
            num_returns: task.num_returns(),
            values: params.iter().map(|p| p.value.wire()).collect(),
            types: params.iter().map(|p| p.data_type).collect(),
            directions: params.iter().map(|p| p.direction).collect(),
            streams: params.iter().map(|p| p.stream).collect(),
            prefixes: params.iter().map(|p| p.prefix.clone()).collect(),
        };
        assert!(
            submission.is_consistent(),
            "parallel parameter arrays differ in length"
        );

        debug!("Processing task:");
        debug!("\t- App id: {}", submission.app_id);
        debug!("\t- Signature: {}", submission.signature);
        debug!("\t- Priority: {}", submission.priority);
        debug!("\t- Has target: {}", submission.has_target);
        debug!("\t- Num nodes: {}", submission.num_nodes);
        debug!("\t- Replicated: {}", submission.replicated);
        debug!("\t- Distributed: {}", submission.distributed);
        debug!("\t- Values: {:?}", submission.values);
        debug!(
            "\t- COMPSs types: {:?}",
            submission.types.iter().map(|t| t.code()).collect::<Vec<_>>()
        );
        debug!(
            "\t- COMPSs directions: {:?}",
            submission.directions.iter().map(|d| d.code()).collect::<Vec<_>>()
        );
        debug!(
            "\t- COMPSs streams: {:?}",
            submission.streams.iter().map(|s| s.code()).collect::<Vec<_>>()
        );
        debug!("\t- COMPSs prefixes: {:?}", submission.prefixes);
        submission
    }
}

/// Bind positional and keyword arguments to the declared parameters.
/// Keywords consumed here are removed from `kwargs`.
fn bind_arguments(
    task: &TaskDescriptor,
    args: Vec<Obj>,
    kwargs: &mut IndexMap<String, Obj>,
    args_as_tuple: bool,
) -> Result<Vec<Parameter>> {
    let declared = task.params.len();
    let got = args.len();
    let mut positional = args.into_iter();
    let mut params = Vec::with_capacity(declared);

    for (name, spec) in &task.params {
        let value = match positional.next() {
            Some(value) => value,
            None => match kwargs.shift_remove(name) {
                Some(value) => value,
                None => spec
                    .default
                    .clone()
                    .ok_or_else(|| MarshalError::MissingArgument(name.clone()))?,
            },
        };
        params.push(Parameter::from_spec(name.clone(), spec, value));
    }

    let extra: Vec<Obj> = positional.collect();
    match &task.varargs {
        Some(name) if args_as_tuple => {
            params.push(Parameter::input(format!("*{}", name), Obj::list(extra)));
        }
        Some(name) => {
            for (i, value) in extra.into_iter().enumerate() {
                params.push(Parameter::input(format!("*{}{}", name, i), value));
            }
        }
        None if !extra.is_empty() => {
            return Err(MarshalError::TooManyArguments {
                expected: declared,
                got,
            }
            .into());
        }
        None => {}
    }
    Ok(params)
}
