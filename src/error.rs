/*
 * Copyright 2020 Damian Peckett <damian@pecke.tt>
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use crate::aws::InstanceState;
use snafu::Snafu;

/// Offpeak error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// Elastic Beanstalk API related errors.
    #[snafu(display("elastic beanstalk api error: {source}"))]
    Beanstalk {
        source: aws_sdk_elasticbeanstalk::Error,
    },

    /// EC2 API related errors.
    #[snafu(display("ec2 api error: {source}"))]
    Ec2 { source: aws_sdk_ec2::Error },

    /// S3 API related errors.
    #[snafu(display("s3 api error: {source}"))]
    S3 { source: aws_sdk_s3::Error },

    /// A required environment variable was not set.
    #[snafu(display("missing required environment variable {name}"))]
    MissingEnv { name: String },

    /// An environment variable held a value that could not be parsed.
    #[snafu(display("invalid value {value:?} for environment variable {name}"))]
    InvalidEnv { name: String, value: String },

    /// The instance disappeared between the listing and a state query.
    #[snafu(display("instance {instance_id} not found"))]
    InstanceNotFound { instance_id: String },

    /// The API reported a lifecycle state this crate does not know about.
    #[snafu(display("unrecognized state {state:?} for instance {instance_id}"))]
    UnrecognizedState { instance_id: String, state: String },

    /// The convergence poller gave up waiting for the expected state.
    #[snafu(display(
        "instance {instance_id} did not reach the {expected} state after {attempts} checks"
    ))]
    ConvergenceTimeout {
        instance_id: String,
        expected: InstanceState,
        attempts: u32,
    },

    /// Free-form errors, used by simulated collaborators in tests.
    #[snafu(whatever, display("{message}"))]
    Whatever { message: String },
}
