use std::fmt::Display;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// A python entry point: a command that invokes a function in a python
/// module, written as `<command> = <module>:<function>`.
///
/// Installing a `noarch: python` package materializes every entry point as
/// an executable in the environment's bin directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    /// The name of the command made available on the command line.
    pub command: String,

    /// The python module that contains the function.
    pub module: String,

    /// The function to run.
    pub function: String,
}

impl FromStr for EntryPoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (command, module_and_function) =
            s.split_once('=').ok_or("missing entry point separator")?;
        let (module, function) = module_and_function
            .split_once(':')
            .ok_or("missing module and function separator")?;

        Ok(EntryPoint {
            command: command.trim().to_string(),
            module: module.trim().to_string(),
            function: function.trim().to_string(),
        })
    }
}

impl Display for EntryPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {}:{}", self.command, self.module, self.function)
    }
}

impl<'de> Deserialize<'de> for EntryPoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}

impl Serialize for EntryPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::EntryPoint;
    use std::str::FromStr;

    #[test]
    fn parse() {
        let entry_point = EntryPoint::from_str("jupyter-lab = jupyterlab.labapp:main").unwrap();
        assert_eq!(entry_point.command, "jupyter-lab");
        assert_eq!(entry_point.module, "jupyterlab.labapp");
        assert_eq!(entry_point.function, "main");
        assert_eq!(
            entry_point.to_string(),
            "jupyter-lab = jupyterlab.labapp:main"
        );
    }

    #[test]
    fn parse_errors() {
        assert!(EntryPoint::from_str("no-separator").is_err());
        assert!(EntryPoint::from_str("cmd = module-without-function").is_err());
    }
}
